//! Error taxonomy.
//!
//! Every public operation returns either a success value or one of these
//! structured errors; nothing panics or throws an unstructured error across
//! the crate boundary. Effect failures inside a resolution run are not
//! errors at this level - they are collected into the per-phase
//! [`EffectExecutionSummary`](crate::pipeline::EffectExecutionSummary).

use serde_json::Value;
use thiserror::Error;

use crate::core::{ConditionId, EncounterId, EntityRef, EventId};

/// Errors raised while parsing or evaluating an expression.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ExpressionError {
    /// An operator key not in the recognized set. Raised at evaluation time
    /// so that operators inside short-circuited branches never error.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// An operand of the wrong type where no coercion rule applies.
    #[error("type mismatch in `{operator}`: {detail}")]
    TypeMismatch { operator: String, detail: String },

    /// Wrong arity or an unrecognized wire shape.
    #[error("malformed expression: {0}")]
    Malformed(String),
}

impl ExpressionError {
    /// Shorthand for [`ExpressionError::TypeMismatch`].
    pub fn type_mismatch(operator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TypeMismatch {
            operator: operator.into(),
            detail: detail.into(),
        }
    }
}

/// Errors raised while validating or applying a patch.
///
/// Application is atomic per call: when any of these is returned the input
/// state is untouched.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PatchError {
    /// The op list failed validation before any mutation.
    #[error("invalid patch syntax: {0}")]
    InvalidSyntax(String),

    /// An explicit `test` op did not match.
    #[error("test failed at `{path}`: expected {expected}, found {found}")]
    TestFailed {
        path: String,
        expected: Value,
        found: Value,
    },

    /// A remove/replace/move/copy referenced a missing pointer.
    #[error("path not found: `{0}`")]
    PathNotFound(String),
}

/// Errors surfaced by the [`RulesEngine`](crate::engine::RulesEngine) query
/// surface.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EngineError {
    #[error("condition {0} not found")]
    ConditionNotFound(ConditionId),

    #[error("condition {0} is inactive")]
    InactiveCondition(ConditionId),

    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("encounter {0} not found")]
    EncounterNotFound(EncounterId),

    #[error("no variable snapshot for entity {0}")]
    EntityNotFound(EntityRef),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
