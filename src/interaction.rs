//! The interaction record: a persisted fact that an initiator performed an action on a target.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::EntityRef;

/// Internally assigned identity of an interaction.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct InteractionId(pub uuid::Uuid);

impl InteractionId {
    /// Generate a fresh, random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `(initiator, target, action)` triple that only-once semantics are keyed on.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct InteractionKey {
    /// Who performed the action.
    pub initiator: EntityRef,
    /// What the action was performed on.
    pub target: EntityRef,
    /// The action.
    pub action: String,
}

/// An interaction that has been accepted but not yet assigned an identity.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewInteraction {
    /// Who performed the action.
    pub initiator: EntityRef,
    /// What the action was performed on.
    pub target: EntityRef,
    /// The action.
    pub action: String,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl NewInteraction {
    /// Stamp this interaction with a fresh identity and the current time.
    pub fn accept(self) -> Interaction {
        Interaction {
            id: InteractionId::generate(),
            initiator: self.initiator,
            target: self.target,
            action: self.action,
            params: self.params,
            created_at: Utc::now(),
        }
    }
}

/// An accepted interaction.  Immutable once created.
///
/// The `(initiator, target, action)` triple is not unique: many interactions of the same kind
/// may coexist unless the policy's repeatability rule forbids it.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Interaction {
    /// Identity assigned at acceptance.
    pub id: InteractionId,
    /// Who performed the action.
    pub initiator: EntityRef,
    /// What the action was performed on.
    pub target: EntityRef,
    /// The action.
    pub action: String,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// When the interaction was accepted.
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    /// True iff this interaction has the given `(initiator, target, action)` triple.
    pub fn matches(&self, key: &InteractionKey) -> bool {
        self.initiator == key.initiator && self.target == key.target && self.action == key.action
    }

    /// The `(initiator, target, action)` triple of this interaction.
    pub fn key(&self) -> InteractionKey {
        InteractionKey {
            initiator: self.initiator.clone(),
            target: self.target.clone(),
            action: self.action.clone(),
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} at {}",
            self.id,
            self.initiator,
            self.action,
            self.target,
            self.created_at.to_rfc3339()
        )
    }
}
