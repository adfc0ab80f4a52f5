//! Persistence for interaction records.
//!
//! The engine treats storage as an external collaborator.  [`InteractionStore`] is the whole of
//! what it needs; [`MemoryStore`] keeps records in process memory and
//! [`JsonlStore`](crate::JsonlStore) appends them to a file.

use std::collections::{HashMap, HashSet};

use crate::{EntityRef, Interaction, InteractionId, InteractionKey, StorageError};

/// The operations the engine requires of a persistence store.
///
/// Stores must surface failures as [`StorageError`] rather than silently dropping writes.
pub trait InteractionStore {
    /// Persist an interaction.  Never overwrites an existing record.
    fn insert(&mut self, interaction: &Interaction) -> Result<(), StorageError>;

    /// True iff some persisted interaction has exactly this `(initiator, target, action)`.
    fn exists(&self, key: &InteractionKey) -> Result<bool, StorageError>;

    /// Every persisted interaction on `target`, in creation order.
    fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError>;

    /// Persist an interaction unless one with the same triple exists.
    ///
    /// Returns false and writes nothing if the triple is already present.  Used when only-once
    /// semantics apply; stores with a native uniqueness constraint should override this so the
    /// check and the write are atomic.
    fn insert_unique(&mut self, interaction: &Interaction) -> Result<bool, StorageError> {
        if self.exists(&interaction.key())? {
            return Ok(false);
        }
        self.insert(interaction)?;
        Ok(true)
    }
}

impl<S: InteractionStore + ?Sized> InteractionStore for Box<S> {
    fn insert(&mut self, interaction: &Interaction) -> Result<(), StorageError> {
        (**self).insert(interaction)
    }

    fn exists(&self, key: &InteractionKey) -> Result<bool, StorageError> {
        (**self).exists(key)
    }

    fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError> {
        (**self).list_by_target(target)
    }

    fn insert_unique(&mut self, interaction: &Interaction) -> Result<bool, StorageError> {
        (**self).insert_unique(interaction)
    }
}

//////////////////////////////////////////// MemoryStore ///////////////////////////////////////////

/// An in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    interactions: Vec<Interaction>,
    ids: HashSet<InteractionId>,
    by_target: HashMap<EntityRef, Vec<usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// True iff the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Every record, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter()
    }

    /// True iff a record with this identity is held.
    pub fn contains(&self, id: &InteractionId) -> bool {
        self.ids.contains(id)
    }
}

impl InteractionStore for MemoryStore {
    fn insert(&mut self, interaction: &Interaction) -> Result<(), StorageError> {
        if !self.ids.insert(interaction.id) {
            return Err(StorageError::backend(format!(
                "interaction {} already stored",
                interaction.id
            )));
        }
        self.by_target
            .entry(interaction.target.clone())
            .or_default()
            .push(self.interactions.len());
        self.interactions.push(interaction.clone());
        Ok(())
    }

    fn exists(&self, key: &InteractionKey) -> Result<bool, StorageError> {
        Ok(self
            .by_target
            .get(&key.target)
            .map(|indices| indices.iter().any(|idx| self.interactions[*idx].matches(key)))
            .unwrap_or(false))
    }

    fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError> {
        Ok(self
            .by_target
            .get(target)
            .map(|indices| {
                indices
                    .iter()
                    .map(|idx| self.interactions[*idx].clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewInteraction;

    fn interaction(initiator: &str, target: &str, action: &str) -> Interaction {
        NewInteraction {
            initiator: EntityRef::new("Healer", initiator),
            target: EntityRef::new("Monster", target),
            action: action.to_string(),
            params: None,
        }
        .accept()
    }

    #[test]
    fn insert_and_query() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());
        let first = interaction("1", "1", "heal");
        let second = interaction("2", "1", "heal");
        let third = interaction("1", "2", "heal");
        store.insert(&first).unwrap();
        store.insert(&second).unwrap();
        store.insert(&third).unwrap();
        assert_eq!(3, store.len());
        assert!(store.exists(&first.key()).unwrap());
        let mut missing = first.key();
        missing.action = "damage".to_string();
        assert!(!store.exists(&missing).unwrap());
        let listed = store
            .list_by_target(&EntityRef::new("Monster", "1"))
            .unwrap();
        assert_eq!(vec![first, second], listed);
        assert!(store
            .list_by_target(&EntityRef::new("Monster", "3"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn insert_never_overwrites() {
        let mut store = MemoryStore::new();
        let first = interaction("1", "1", "heal");
        store.insert(&first).unwrap();
        let err = store.insert(&first).unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
        assert_eq!(1, store.len());
        assert!(store.contains(&first.id));
    }

    #[test]
    fn many_inserts() {
        let mut store = MemoryStore::new();
        let mut last = None;
        for idx in 0..50_000 {
            let record = interaction(&idx.to_string(), &(idx % 7).to_string(), "heal");
            store.insert(&record).unwrap();
            last = Some(record);
        }
        assert_eq!(50_000, store.len());
        let last = last.unwrap();
        assert!(store.contains(&last.id));
        assert!(store.exists(&last.key()).unwrap());
        assert!(store.insert(&last).is_err());
    }

    #[test]
    fn insert_unique_refuses_duplicate_triple() {
        let mut store = MemoryStore::new();
        assert!(store.insert_unique(&interaction("1", "1", "heal")).unwrap());
        assert!(!store.insert_unique(&interaction("1", "1", "heal")).unwrap());
        assert!(store.insert_unique(&interaction("1", "1", "damage")).unwrap());
        assert_eq!(2, store.len());
    }

    #[test]
    fn boxed_store_delegates() {
        let mut store: Box<dyn InteractionStore> = Box::new(MemoryStore::new());
        let first = interaction("1", "1", "heal");
        store.insert(&first).unwrap();
        assert!(store.exists(&first.key()).unwrap());
        assert!(!store.insert_unique(&first).unwrap());
    }
}
