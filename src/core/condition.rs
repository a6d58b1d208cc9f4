//! Narrative conditions.
//!
//! A Condition attaches a boolean/value expression to an entity (or to a
//! whole entity type) under a named field. Conditions are created and
//! versioned by the external API layer; the engine reads them to gate
//! effects and to answer "evaluate this condition" queries. Inactive
//! conditions are excluded from evaluation and from the dependency graph.

use serde::{Deserialize, Serialize};

use crate::expr::Expression;

use super::entity::{BranchId, CampaignId, ConditionId, EntityRef};

/// A persisted condition record, read-only to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub campaign_id: CampaignId,
    pub branch_id: BranchId,
    pub entity: EntityRef,
    /// The entity field or aspect this condition speaks about.
    pub field: String,
    pub expression: Expression,
    pub description: String,
    pub priority: i32,
    pub is_active: bool,
    pub version: u32,
}

impl Condition {
    /// Create an active v1 condition. Scope ids default to fresh values;
    /// use the builder methods to attach to an existing campaign/branch.
    #[must_use]
    pub fn new(entity: EntityRef, field: impl Into<String>, expression: Expression) -> Self {
        Self {
            id: ConditionId::new(),
            campaign_id: CampaignId::new(),
            branch_id: BranchId::new(),
            entity,
            field: field.into(),
            expression,
            description: String::new(),
            priority: 0,
            is_active: true,
            version: 1,
        }
    }

    /// Scope to a campaign/branch.
    #[must_use]
    pub fn in_scope(mut self, campaign_id: CampaignId, branch_id: BranchId) -> Self {
        self.campaign_id = campaign_id;
        self.branch_id = branch_id;
        self
    }

    /// Set the human description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Deactivate the condition.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
