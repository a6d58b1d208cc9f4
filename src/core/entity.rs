//! Entity identification and campaign scoping.
//!
//! Every campaign object a Condition or Effect can attach to (settlement,
//! kingdom, character, ...) is addressed by an [`EntityRef`]: an entity type
//! plus an optional instance id. A reference without an instance id is
//! *type-level* and applies to every instance of that type.
//!
//! Record ids ([`ConditionId`], [`EffectId`], ...) wrap UUIDs because the
//! records are minted and persisted by the external API layer; the engine
//! only ever reads them.
//!
//! ## Usage
//!
//! ```
//! use campaign_rules::core::{EntityRef, EntityType};
//!
//! let instance = EntityRef::instance(EntityType::Settlement, uuid::Uuid::new_v4());
//! let type_level = EntityRef::type_level(EntityType::Settlement);
//!
//! assert!(type_level.applies_to(&instance));
//! assert!(!instance.applies_to(&type_level));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a persisted Condition record.
    ConditionId
);
record_id!(
    /// Identifier of a persisted Effect record.
    EffectId
);
record_id!(
    /// Identifier of an Event record awaiting resolution.
    EventId
);
record_id!(
    /// Identifier of an Encounter record awaiting resolution.
    EncounterId
);
record_id!(
    /// Campaign scope for conditions, effects and graph queries.
    CampaignId
);
record_id!(
    /// Branch scope within a campaign (alternate timelines).
    BranchId
);

/// The kinds of campaign entity that carry variable state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Settlement,
    Structure,
    Kingdom,
    Party,
    Character,
    Encounter,
    Event,
}

impl EntityType {
    /// Stable lowercase name, used in graph node ids and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Settlement => "settlement",
            Self::Structure => "structure",
            Self::Kingdom => "kingdom",
            Self::Party => "party",
            Self::Character => "character",
            Self::Encounter => "encounter",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a campaign entity, or to every instance of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    /// `None` means type-level: the record applies to all instances.
    pub entity_id: Option<Uuid>,
}

impl EntityRef {
    /// Reference a specific entity instance.
    #[must_use]
    pub const fn instance(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            entity_type,
            entity_id: Some(entity_id),
        }
    }

    /// Reference every instance of a type.
    #[must_use]
    pub const fn type_level(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entity_id: None,
        }
    }

    /// Check whether this reference is type-level.
    #[must_use]
    pub const fn is_type_level(&self) -> bool {
        self.entity_id.is_none()
    }

    /// Check whether a record attached to `self` applies to `target`.
    ///
    /// Instance references match only themselves; type-level references
    /// match every instance of the same type.
    #[must_use]
    pub fn applies_to(&self, target: &EntityRef) -> bool {
        self.entity_type == target.entity_type
            && (self.entity_id.is_none() || self.entity_id == target.entity_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity_id {
            Some(id) => write!(f, "{}:{}", self.entity_type, id),
            None => write!(f, "{}:*", self.entity_type),
        }
    }
}
