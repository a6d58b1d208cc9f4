//! Effects and timing phases.
//!
//! An Effect carries an ordered patch payload to apply to an entity's
//! variable state when an event or encounter resolves, in one of three
//! timing phases. An optional guard condition gates the effect: absent
//! guard means always applicable, a guard that evaluates falsy skips it.

use serde::{Deserialize, Serialize};

use crate::patch::PatchOp;

use super::entity::{BranchId, CampaignId, ConditionId, EffectId, EntityRef};

/// When during resolution an effect applies.
///
/// Phases run strictly in declaration order and are never re-entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectTiming {
    Pre,
    OnResolve,
    Post,
}

impl EffectTiming {
    /// Stable wire/log name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "PRE",
            Self::OnResolve => "ON_RESOLVE",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for EffectTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted effect record, read-only to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EffectId,
    pub campaign_id: CampaignId,
    pub branch_id: BranchId,
    pub entity: EntityRef,
    pub timing: EffectTiming,
    /// Higher priority applies first; ties keep insertion order.
    pub priority: i32,
    /// Optional guard: the owning condition that must evaluate truthy.
    pub condition_id: Option<ConditionId>,
    pub is_active: bool,
    /// Ordered patch operations, applied atomically as one unit.
    pub payload: Vec<PatchOp>,
}

impl Effect {
    /// Create an active, unguarded effect.
    #[must_use]
    pub fn new(entity: EntityRef, timing: EffectTiming, payload: Vec<PatchOp>) -> Self {
        Self {
            id: EffectId::new(),
            campaign_id: CampaignId::new(),
            branch_id: BranchId::new(),
            entity,
            timing,
            priority: 0,
            condition_id: None,
            is_active: true,
            payload,
        }
    }

    /// Scope to a campaign/branch.
    #[must_use]
    pub fn in_scope(mut self, campaign_id: CampaignId, branch_id: BranchId) -> Self {
        self.campaign_id = campaign_id;
        self.branch_id = branch_id;
        self
    }

    /// Gate on a condition.
    #[must_use]
    pub fn guarded_by(mut self, condition_id: ConditionId) -> Self {
        self.condition_id = Some(condition_id);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Deactivate the effect.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
