//! Phase-ordered effect resolution.
//!
//! - `resolver`: the PRE / ON_RESOLVE / POST pipeline itself
//!
//! Per-phase outcomes are reported, never thrown: an effect that fails
//! leaves state untouched and is tallied alongside the ones that applied.

pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::core::{EffectId, EntityRef, VariableState};

pub use resolver::ResolutionPipeline;

/// One effect that did not apply, with the reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectFailure {
    pub effect_id: EffectId,
    pub message: String,
}

/// Aggregate health of a finished phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    /// Every selected effect applied (including the vacuous empty phase).
    Clean,
    /// Some applied, some failed.
    CompletedWithWarnings,
    /// At least one effect was selected and none applied.
    AllFailed,
}

/// Tally of a single phase run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectExecutionSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<EffectFailure>,
}

impl EffectExecutionSummary {
    #[must_use]
    pub fn status(&self) -> PhaseStatus {
        match (self.succeeded, self.failed) {
            (_, 0) => PhaseStatus::Clean,
            (0, _) => PhaseStatus::AllFailed,
            _ => PhaseStatus::CompletedWithWarnings,
        }
    }
}

/// Everything a completed resolution hands back: the final state plus the
/// per-phase tallies, in phase order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub entity: EntityRef,
    pub state: VariableState,
    pub pre: EffectExecutionSummary,
    pub on_resolve: EffectExecutionSummary,
    pub post: EffectExecutionSummary,
}
