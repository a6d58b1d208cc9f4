//! Patch application and diffing.
//!
//! Ops execute in array order against a working copy of the entity's
//! variable document; any failure - a failed `test` included - returns the
//! error and leaves the input state untouched. One call is the atomicity
//! unit: an effect's payload either fully applies or not at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::VariableState;
use crate::error::PatchError;

use super::op::{validate, PatchOp, PatchOpKind};
use super::pointer;

/// An old/new pair for a modified variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

/// Structural diff between two states, at variable-name granularity.
/// Ordered maps keep audit output deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub added: BTreeMap<String, Value>,
    pub modified: BTreeMap<String, ValueChange>,
    pub removed: BTreeMap<String, Value>,
}

impl StateDiff {
    /// Check whether the patch changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Validate and apply an op list, returning the new state and a diff.
///
/// Validation errors surface as [`PatchError::InvalidSyntax`] before any
/// mutation; validation warnings do not block application.
pub fn apply(state: &VariableState, ops: &[PatchOp]) -> Result<(VariableState, StateDiff), PatchError> {
    let validation = validate(ops);
    if !validation.is_valid() {
        return Err(PatchError::InvalidSyntax(validation.errors.join("; ")));
    }

    let mut doc = state.to_document();
    for op in ops {
        // Validation guarantees a known kind
        let kind = op
            .kind()
            .ok_or_else(|| PatchError::InvalidSyntax(format!("unknown op `{}`", op.op)))?;
        apply_op(&mut doc, op, kind)?;
    }

    let next = VariableState::from_document(&doc).ok_or_else(|| {
        PatchError::InvalidSyntax("patch replaced /variables with a non-object".to_string())
    })?;
    let diff = diff(state, &next);
    Ok((next, diff))
}

fn apply_op(doc: &mut Value, op: &PatchOp, kind: PatchOpKind) -> Result<(), PatchError> {
    match kind {
        PatchOpKind::Add => {
            let value = required_value(op)?;
            let tokens = pointer::parse(&op.path)?;
            add_value(doc, &op.path, &tokens, value)
        }
        PatchOpKind::Remove => {
            let tokens = pointer::parse(&op.path)?;
            remove_value(doc, &op.path, &tokens).map(|_| ())
        }
        PatchOpKind::Replace => {
            let value = required_value(op)?;
            let tokens = pointer::parse(&op.path)?;
            replace_value(doc, &op.path, &tokens, value)
        }
        PatchOpKind::Move => {
            let from = required_from(op)?;
            let from_tokens = pointer::parse(from)?;
            let tokens = pointer::parse(&op.path)?;
            if tokens.len() > from_tokens.len() && tokens.starts_with(&from_tokens) {
                return Err(PatchError::InvalidSyntax(format!(
                    "cannot move `{from}` into its own child `{}`",
                    op.path
                )));
            }
            let moved = remove_value(doc, from, &from_tokens)?;
            add_value(doc, &op.path, &tokens, moved)
        }
        PatchOpKind::Copy => {
            let from = required_from(op)?;
            let from_tokens = pointer::parse(from)?;
            let copied = pointer::get(doc, &from_tokens)
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound(from.to_string()))?;
            let tokens = pointer::parse(&op.path)?;
            add_value(doc, &op.path, &tokens, copied)
        }
        PatchOpKind::Test => {
            let expected = required_value(op)?;
            let tokens = pointer::parse(&op.path)?;
            let found = pointer::get(doc, &tokens)
                .ok_or_else(|| PatchError::PathNotFound(op.path.clone()))?;
            if *found != expected {
                return Err(PatchError::TestFailed {
                    path: op.path.clone(),
                    expected,
                    found: found.clone(),
                });
            }
            Ok(())
        }
    }
}

fn required_value(op: &PatchOp) -> Result<Value, PatchError> {
    op.value
        .clone()
        .ok_or_else(|| PatchError::InvalidSyntax(format!("`{}` requires a value", op.op)))
}

fn required_from(op: &PatchOp) -> Result<&str, PatchError> {
    op.from
        .as_deref()
        .ok_or_else(|| PatchError::InvalidSyntax(format!("`{}` requires a from pointer", op.op)))
}

/// RFC 6902 `add`: insert into an object (replacing an existing member) or
/// into an array at an index, with `-` meaning append.
fn add_value(doc: &mut Value, path: &str, tokens: &[String], value: Value) -> Result<(), PatchError> {
    let Some((last, parent_tokens)) = tokens.split_last() else {
        // Validation rejects the empty path; kept defensive-free by erroring.
        return Err(PatchError::PathNotFound(path.to_string()));
    };
    let parent = pointer::get_mut(doc, parent_tokens)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last.as_str() == "-" {
                items.push(value);
                return Ok(());
            }
            let index = pointer::array_index(last)
                .filter(|i| *i <= items.len())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn remove_value(doc: &mut Value, path: &str, tokens: &[String]) -> Result<Value, PatchError> {
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::PathNotFound(path.to_string()));
    };
    let parent = pointer::get_mut(doc, parent_tokens)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match parent {
        Value::Object(map) => map
            .remove(last.as_str())
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = pointer::array_index(last)
                .filter(|i| *i < items.len())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            Ok(items.remove(index))
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn replace_value(doc: &mut Value, path: &str, tokens: &[String], value: Value) -> Result<(), PatchError> {
    let target =
        pointer::get_mut(doc, tokens).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    *target = value;
    Ok(())
}

fn diff(old: &VariableState, new: &VariableState) -> StateDiff {
    let mut diff = StateDiff::default();

    for (name, old_value) in old.iter() {
        match new.get(name) {
            None => {
                diff.removed.insert(name.clone(), old_value.clone());
            }
            Some(new_value) if new_value != old_value => {
                diff.modified.insert(
                    name.clone(),
                    ValueChange {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (name, new_value) in new.iter() {
        if old.get(name).is_none() {
            diff.added.insert(name.clone(), new_value.clone());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> VariableState {
        VariableState::new()
            .with_var("unrest", json!(3))
            .with_var("settlement", json!({"population": 1200, "tags": ["coastal"]}))
    }

    #[test]
    fn test_add_remove_round_trip() {
        let original = VariableState::new();
        let (with_x, diff) =
            apply(&original, &[PatchOp::add("/variables/x", json!(5))]).unwrap();
        assert_eq!(with_x.get("x"), Some(&json!(5)));
        assert_eq!(diff.added.get("x"), Some(&json!(5)));

        let (back, diff) = apply(&with_x, &[PatchOp::remove("/variables/x")]).unwrap();
        assert_eq!(back, original);
        assert_eq!(diff.removed.get("x"), Some(&json!(5)));
    }

    #[test]
    fn test_nested_and_array_targets() {
        let (next, _) = apply(
            &state(),
            &[
                PatchOp::replace("/variables/settlement/population", json!(900)),
                PatchOp::add("/variables/settlement/tags/-", json!("trade_hub")),
                PatchOp::add("/variables/settlement/tags/0", json!("walled")),
            ],
        )
        .unwrap();

        assert_eq!(
            next.get("settlement"),
            Some(&json!({"population": 900, "tags": ["walled", "coastal", "trade_hub"]}))
        );
    }

    #[test]
    fn test_failing_test_is_atomic() {
        let original = state();
        let err = apply(
            &original,
            &[
                PatchOp::replace("/variables/unrest", json!(9)),
                PatchOp::test("/variables/unrest", json!(3)),
                PatchOp::add("/variables/never", json!(true)),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, PatchError::TestFailed { .. }));
        assert_eq!(original, state());
    }

    #[test]
    fn test_passing_test_allows_rest() {
        let (next, _) = apply(
            &state(),
            &[
                PatchOp::test("/variables/unrest", json!(3)),
                PatchOp::replace("/variables/unrest", json!(4)),
            ],
        )
        .unwrap();
        assert_eq!(next.get("unrest"), Some(&json!(4)));
    }

    #[test]
    fn test_path_not_found() {
        let err = apply(&state(), &[PatchOp::remove("/variables/morale")]).unwrap_err();
        assert_eq!(err, PatchError::PathNotFound("/variables/morale".to_string()));

        let err = apply(
            &state(),
            &[PatchOp::replace("/variables/settlement/tags/9", json!("x"))],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound(_)));
    }

    #[test]
    fn test_move_and_copy() {
        let (next, diff) = apply(
            &state(),
            &[PatchOp::move_from("/variables/unrest", "/variables/tension")],
        )
        .unwrap();
        assert_eq!(next.get("unrest"), None);
        assert_eq!(next.get("tension"), Some(&json!(3)));
        assert!(diff.removed.contains_key("unrest"));
        assert!(diff.added.contains_key("tension"));

        let (next, _) = apply(
            &state(),
            &[PatchOp::copy_from("/variables/unrest", "/variables/tension")],
        )
        .unwrap();
        assert_eq!(next.get("unrest"), Some(&json!(3)));
        assert_eq!(next.get("tension"), Some(&json!(3)));
    }

    #[test]
    fn test_move_into_own_child_is_rejected() {
        let err = apply(
            &state(),
            &[PatchOp::move_from(
                "/variables/settlement",
                "/variables/settlement/inner",
            )],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::InvalidSyntax(_)));
    }

    #[test]
    fn test_validation_errors_block_application() {
        let mut bad = PatchOp::add("/variables/x", json!(1));
        bad.op = "frobnicate".to_string();
        let original = state();
        let err = apply(&original, &[PatchOp::replace("/variables/unrest", json!(9)), bad])
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidSyntax(_)));
        assert_eq!(original, state());
    }

    #[test]
    fn test_non_variable_target_is_discarded() {
        let (next, diff) =
            apply(&state(), &[PatchOp::add("/audit", json!("note"))]).unwrap();
        assert_eq!(next, state());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_modified_pairs() {
        let (_, diff) = apply(
            &state(),
            &[PatchOp::replace("/variables/unrest", json!(5))],
        )
        .unwrap();
        assert_eq!(
            diff.modified.get("unrest"),
            Some(&ValueChange {
                old: json!(3),
                new: json!(5)
            })
        );
    }
}
