//! Polymorphic entity identity.
//!
//! The engine never looks inside an entity.  It compares [`EntityRef`]s and hands `&dyn Entity`
//! to the predicates and hooks that the owning entity type supplied.

use std::any::Any;
use std::fmt;

/// A reference to an entity: its type tag plus its identity key.
///
/// Two references are equal iff both the type tag and the identity key are equal.
///
/// # Example
///
/// ```
/// use interactions::EntityRef;
///
/// let monster = EntityRef::new("Monster", "1");
/// assert_eq!(monster, EntityRef::new("Monster", "1"));
/// assert_ne!(monster, EntityRef::new("Healer", "1"));
/// assert_eq!("Monster#1", monster.to_string());
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct EntityRef {
    /// The type tag of the entity (e.g., "Monster").
    pub kind: String,
    /// The identity key of the entity within its type.
    pub key: String,
}

impl EntityRef {
    /// Create a new entity reference.
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.key)
    }
}

/// An application entity that can be the initiator or the target of an interaction.
///
/// Implementors report their identity and, optionally, the supertypes they are recognized as.
/// Predicates and hooks receive `&dyn Entity` and use [`downcast_ref`](trait.Entity.html#method.downcast_ref)
/// to get back to the concrete type.
pub trait Entity: Any {
    /// The identity of this entity.
    fn entity_ref(&self) -> EntityRef;

    /// Upcast for downcasting in predicates and hooks.
    fn as_any(&self) -> &dyn Any;

    /// True iff this entity's runtime type is `kind` or a recognized subtype of it.
    fn is_a(&self, kind: &str) -> bool {
        self.entity_ref().kind == kind
    }
}

impl dyn Entity {
    /// Downcast to a concrete entity type.
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Entity for EntityRef {
    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Paladin {
        id: u64,
    }

    impl Entity for Paladin {
        fn entity_ref(&self) -> EntityRef {
            EntityRef::new("Paladin", self.id.to_string())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn is_a(&self, kind: &str) -> bool {
            matches!(kind, "Paladin" | "Healer")
        }
    }

    #[test]
    fn entity_ref_equality() {
        assert_eq!(EntityRef::new("Monster", "1"), EntityRef::new("Monster", "1"));
        assert_ne!(EntityRef::new("Monster", "1"), EntityRef::new("Monster", "2"));
        assert_ne!(EntityRef::new("Monster", "1"), EntityRef::new("Healer", "1"));
    }

    #[test]
    fn entity_ref_serialization() {
        let entity = EntityRef::new("Monster", "42");
        let serialized = serde_json::to_value(&entity).unwrap();
        assert_eq!(serde_json::json! {{"kind": "Monster", "key": "42"}}, serialized);
        let deserialized: EntityRef = serde_json::from_value(serialized).unwrap();
        assert_eq!(entity, deserialized);
    }

    #[test]
    fn entity_ref_is_exact_kind_only() {
        let entity = EntityRef::new("Paladin", "1");
        assert!(entity.is_a("Paladin"));
        assert!(!entity.is_a("Healer"));
    }

    #[test]
    fn subtype_and_downcast() {
        let paladin = Paladin { id: 7 };
        let entity: &dyn Entity = &paladin;
        assert!(entity.is_a("Healer"));
        assert!(entity.is_a("Paladin"));
        assert!(!entity.is_a("Warrior"));
        assert_eq!(7, entity.downcast_ref::<Paladin>().unwrap().id);
        assert!(entity.downcast_ref::<EntityRef>().is_none());
    }
}
