//! Patch operations and validation.
//!
//! Effects carry their mutations as an ordered list of RFC-6902-style ops,
//! restricted in intended use to paths rooted at `/variables/`. Validation
//! is two-tier: structural problems are errors and block application;
//! oddities that an author may have meant (unknown extra fields, paths
//! outside `/variables/`) are warnings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PatchError;

/// The six canonical RFC-6902 operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl PatchOpKind {
    /// Parse the wire name of an op kind.
    #[must_use]
    pub fn from_str(op: &str) -> Option<Self> {
        match op {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "replace" => Some(Self::Replace),
            "move" => Some(Self::Move),
            "copy" => Some(Self::Copy),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Whether this kind requires a `value` field.
    #[must_use]
    pub const fn requires_value(self) -> bool {
        matches!(self, Self::Add | Self::Replace | Self::Test)
    }

    /// Whether this kind requires a `from` pointer.
    #[must_use]
    pub const fn requires_from(self) -> bool {
        matches!(self, Self::Move | Self::Copy)
    }
}

/// One structured patch operation.
///
/// The `op` field stays a string so that an unrecognized kind is a
/// validation error rather than a deserialization failure; unrecognized
/// extra fields are captured and reported as warnings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl PatchOp {
    fn bare(kind: PatchOpKind, path: impl Into<String>) -> Self {
        let op = match kind {
            PatchOpKind::Add => "add",
            PatchOpKind::Remove => "remove",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Move => "move",
            PatchOpKind::Copy => "copy",
            PatchOpKind::Test => "test",
        };
        Self {
            op: op.to_string(),
            path: path.into(),
            value: None,
            from: None,
            extra: Map::new(),
        }
    }

    /// Create an `add` op.
    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::bare(PatchOpKind::Add, path)
        }
    }

    /// Create a `remove` op.
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self::bare(PatchOpKind::Remove, path)
    }

    /// Create a `replace` op.
    #[must_use]
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::bare(PatchOpKind::Replace, path)
        }
    }

    /// Create a `move` op.
    #[must_use]
    pub fn move_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            ..Self::bare(PatchOpKind::Move, path)
        }
    }

    /// Create a `copy` op.
    #[must_use]
    pub fn copy_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            ..Self::bare(PatchOpKind::Copy, path)
        }
    }

    /// Create a `test` op.
    #[must_use]
    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::bare(PatchOpKind::Test, path)
        }
    }

    /// The canonical kind, if `op` names one.
    #[must_use]
    pub fn kind(&self) -> Option<PatchOpKind> {
        PatchOpKind::from_str(&self.op)
    }

    /// Parse a wire payload (a JSON array of op objects).
    pub fn parse_list(payload: &Value) -> Result<Vec<Self>, PatchError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| PatchError::InvalidSyntax(e.to_string()))
    }
}

/// Outcome of validating an op list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PatchValidation {
    /// Valid means applicable: warnings do not block application.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate an op list without touching any state.
#[must_use]
pub fn validate(ops: &[PatchOp]) -> PatchValidation {
    let mut result = PatchValidation::default();

    for (index, op) in ops.iter().enumerate() {
        let Some(kind) = op.kind() else {
            result
                .errors
                .push(format!("op[{index}]: unknown op `{}`", op.op));
            continue;
        };

        if !op.path.starts_with('/') {
            result.errors.push(format!(
                "op[{index}]: path `{}` must start with `/`",
                op.path
            ));
        } else if !is_variable_path(&op.path) {
            result.warnings.push(format!(
                "op[{index}]: path `{}` does not target `/variables/`",
                op.path
            ));
        }

        if kind.requires_value() && op.value.is_none() {
            result
                .errors
                .push(format!("op[{index}]: `{}` requires a value", op.op));
        }

        if kind.requires_from() {
            match op.from.as_deref() {
                None => result
                    .errors
                    .push(format!("op[{index}]: `{}` requires a from pointer", op.op)),
                Some(from) if !from.starts_with('/') => result.errors.push(format!(
                    "op[{index}]: from pointer `{from}` must start with `/`"
                )),
                Some(from) if !is_variable_path(from) => result.warnings.push(format!(
                    "op[{index}]: from pointer `{from}` does not target `/variables/`"
                )),
                Some(_) => {}
            }
        }

        if !op.extra.is_empty() {
            let keys: Vec<&str> = op.extra.keys().map(String::as_str).collect();
            result.warnings.push(format!(
                "op[{index}]: unrecognized fields: {}",
                keys.join(", ")
            ));
        }
    }

    result
}

fn is_variable_path(path: &str) -> bool {
    path.starts_with("/variables/")
}
