//! The interaction log: an append-only record of accepted interactions.

use crate::{
    EntityRef, Interaction, InteractionKey, InteractionStore, NewInteraction, StorageError,
};

/// Append-only log of accepted interactions over an [`InteractionStore`].
///
/// The log assigns identity and timestamp on append and never overwrites or deletes.
#[derive(Debug, Default)]
pub struct InteractionLog<S> {
    store: S,
}

impl<S: InteractionStore> InteractionLog<S> {
    /// Create a log over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the log, returning the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Accept `new`, assigning it an identity and timestamp, and persist it.
    pub fn append(&mut self, new: NewInteraction) -> Result<Interaction, StorageError> {
        let interaction = new.accept();
        self.store.insert(&interaction)?;
        Ok(interaction)
    }

    /// Like [`append`](Self::append), but write nothing and return `None` if an interaction with
    /// the same triple is already persisted.
    pub fn append_unique(
        &mut self,
        new: NewInteraction,
    ) -> Result<Option<Interaction>, StorageError> {
        let interaction = new.accept();
        if self.store.insert_unique(&interaction)? {
            Ok(Some(interaction))
        } else {
            Ok(None)
        }
    }

    /// Persist an interaction that was accepted earlier, preserving its identity.
    ///
    /// Returns false and writes nothing if `unique` is set and the triple is already persisted.
    pub(crate) fn commit(
        &mut self,
        interaction: &Interaction,
        unique: bool,
    ) -> Result<bool, StorageError> {
        if unique {
            self.store.insert_unique(interaction)
        } else {
            self.store.insert(interaction)?;
            Ok(true)
        }
    }

    /// True iff an interaction with exactly this triple has been persisted.
    pub fn exists(&self, key: &InteractionKey) -> Result<bool, StorageError> {
        self.store.exists(key)
    }

    /// Every persisted interaction on `target`, in creation order.
    pub fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError> {
        self.store.list_by_target(target)
    }

    /// Every persisted interaction of `action` on `target`, in creation order.
    pub fn list_by_target_action(
        &self,
        target: &EntityRef,
        action: &str,
    ) -> Result<Vec<Interaction>, StorageError> {
        let mut interactions = self.store.list_by_target(target)?;
        interactions.retain(|i| i.action == action);
        Ok(interactions)
    }

    /// Number of persisted interactions on `target`.
    pub fn count_by_target(&self, target: &EntityRef) -> Result<usize, StorageError> {
        Ok(self.store.list_by_target(target)?.len())
    }
}

//////////////////////////////////////// PendingInteractions ///////////////////////////////////////

/// Interactions accepted within a unit of work that have not been committed to the log.
#[derive(Clone, Debug, Default)]
pub struct PendingInteractions {
    staged: Vec<Staged>,
}

#[derive(Clone, Debug)]
pub(crate) struct Staged {
    pub interaction: Interaction,
    // accepted under only-once semantics; commit must not duplicate the triple
    pub unique: bool,
}

impl PendingInteractions {
    /// Accept `new` into the pending set.  `unique` marks an interaction accepted under
    /// only-once semantics.
    pub fn stage(&mut self, new: NewInteraction, unique: bool) -> Interaction {
        let interaction = new.accept();
        self.staged.push(Staged {
            interaction: interaction.clone(),
            unique,
        });
        interaction
    }

    /// True iff a pending interaction has exactly this triple.
    pub fn exists(&self, key: &InteractionKey) -> bool {
        self.staged.iter().any(|s| s.interaction.matches(key))
    }

    /// Pending interactions on `target`, in acceptance order.
    pub fn list_by_target(&self, target: &EntityRef) -> Vec<Interaction> {
        self.staged
            .iter()
            .filter(|s| s.interaction.target == *target)
            .map(|s| s.interaction.clone())
            .collect()
    }

    /// Number of pending interactions.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// True iff nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Staged> {
        self.staged.drain(..)
    }
}

/// Existence check over the persisted log and, when given, the pending set.
pub(crate) fn exists_anywhere<S: InteractionStore>(
    log: &InteractionLog<S>,
    pending: Option<&PendingInteractions>,
    key: &InteractionKey,
) -> Result<bool, StorageError> {
    if let Some(pending) = pending {
        if pending.exists(key) {
            return Ok(true);
        }
    }
    log.exists(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn new(initiator: &str, action: &str) -> NewInteraction {
        NewInteraction {
            initiator: EntityRef::new("Healer", initiator),
            target: EntityRef::new("Monster", "1"),
            action: action.to_string(),
            params: None,
        }
    }

    #[test]
    fn append_assigns_identity() {
        let mut log = InteractionLog::new(MemoryStore::new());
        let first = log.append(new("1", "heal")).unwrap();
        let second = log.append(new("1", "heal")).unwrap();
        assert_ne!(first.id, second.id);
        let target = EntityRef::new("Monster", "1");
        assert_eq!(vec![first, second], log.list_by_target(&target).unwrap());
        assert_eq!(2, log.count_by_target(&target).unwrap());
    }

    #[test]
    fn append_unique() {
        let mut log = InteractionLog::new(MemoryStore::new());
        assert!(log.append_unique(new("1", "heal")).unwrap().is_some());
        assert!(log.append_unique(new("1", "heal")).unwrap().is_none());
        assert_eq!(1, log.store().len());
    }

    #[test]
    fn list_by_target_action_filters() {
        let mut log = InteractionLog::new(MemoryStore::new());
        log.append(new("1", "heal")).unwrap();
        log.append(new("1", "damage")).unwrap();
        log.append(new("2", "heal")).unwrap();
        let target = EntityRef::new("Monster", "1");
        let heals = log.list_by_target_action(&target, "heal").unwrap();
        assert_eq!(2, heals.len());
        assert!(heals.iter().all(|i| i.action == "heal"));
    }

    #[test]
    fn pending_is_consulted_before_the_log() {
        let log = InteractionLog::new(MemoryStore::new());
        let mut pending = PendingInteractions::default();
        let staged = pending.stage(new("1", "heal"), true);
        assert!(!exists_anywhere(&log, None, &staged.key()).unwrap());
        assert!(exists_anywhere(&log, Some(&pending), &staged.key()).unwrap());
        let first = EntityRef::new("Monster", "1");
        let second = EntityRef::new("Monster", "2");
        assert_eq!(1, pending.list_by_target(&first).len());
        assert!(pending.list_by_target(&second).is_empty());
    }

    #[test]
    fn commit_respects_uniqueness() {
        let mut log = InteractionLog::new(MemoryStore::new());
        log.append(new("1", "heal")).unwrap();
        let mut pending = PendingInteractions::default();
        pending.stage(new("1", "heal"), true);
        pending.stage(new("1", "heal"), false);
        let committed = pending
            .drain()
            .map(|s| log.commit(&s.interaction, s.unique).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(vec![false, true], committed);
        assert_eq!(2, log.store().len());
        assert!(pending.is_empty());
    }
}
