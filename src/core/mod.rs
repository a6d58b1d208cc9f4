//! Core domain types: entities, conditions, effects, variable state,
//! event/encounter records.
//!
//! Everything here is a record the engine consumes read-only (persistence
//! belongs to the caller) or a value it derives and hands back.

pub mod condition;
pub mod effect;
pub mod entity;
pub mod record;
pub mod state;

pub use condition::Condition;
pub use effect::{Effect, EffectTiming};
pub use entity::{
    BranchId, CampaignId, ConditionId, EffectId, EncounterId, EntityRef, EntityType, EventId,
};
pub use record::{EncounterRecord, EventRecord};
pub use state::VariableState;
