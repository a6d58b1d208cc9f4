//! Event and encounter records.
//!
//! The scheduler that decides *when* to resolve lives outside this crate;
//! these records carry only what the resolution pipeline needs: which
//! entity's state to run against. Completion bookkeeping stays with the
//! caller.

use serde::{Deserialize, Serialize};

use super::entity::{EncounterId, EntityRef, EventId};

/// An event awaiting resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub entity: EntityRef,
}

impl EventRecord {
    /// Create an event targeting an entity.
    #[must_use]
    pub fn new(entity: EntityRef) -> Self {
        Self {
            id: EventId::new(),
            entity,
        }
    }
}

/// An encounter awaiting resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub id: EncounterId,
    pub entity: EntityRef,
}

impl EncounterRecord {
    /// Create an encounter targeting an entity.
    #[must_use]
    pub fn new(entity: EntityRef) -> Self {
        Self {
            id: EncounterId::new(),
            entity,
        }
    }
}
