//! The interaction facade: the operations consumers call.

use crate::evaluator::{evaluate_detailed, Decision};
use crate::hooks::{HookContext, Veto};
use crate::{
    Entity, EntityRef, InteractError, Interaction, InteractionLog, InteractionStore, MemoryStore,
    NewInteraction, PendingInteractions, Registry, StorageError, StoragePhase,
    UnknownActionError,
};

/////////////////////////////////////////////// Outcome ////////////////////////////////////////////

/// What happened to a perform request that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The interaction was accepted and recorded.
    Recorded(Interaction),
    /// The policy refused the interaction.  No hooks ran and nothing was recorded.
    Denied(Decision),
    /// A before-hook rejected the interaction.  Nothing was recorded and no after-hooks ran.
    Vetoed(Veto),
}

impl Outcome {
    /// True iff the interaction was recorded.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Outcome::Recorded(_))
    }

    /// The recorded interaction, if any.
    pub fn interaction(&self) -> Option<&Interaction> {
        match self {
            Outcome::Recorded(interaction) => Some(interaction),
            _ => None,
        }
    }
}

//////////////////////////////////////////////// Engine ////////////////////////////////////////////

/// Evaluates policies and records accepted interactions.
///
/// `perform` is one sequential critical section: evaluate, run before-hooks, append, run
/// after-hooks.  Callers in a concurrent host must serialize `perform` per target.
///
/// # Example
///
/// ```
/// use interactions::{Engine, EntityRef, InitiatorRule, PolicyConfig, Registry};
///
/// let mut registry = Registry::default();
/// registry
///     .register("Monster", PolicyConfig::new("heal").with(InitiatorRule::of_type("Healer")).only_once(true))
///     .unwrap();
/// let mut engine = Engine::in_memory(registry);
/// let monster = EntityRef::new("Monster", "1");
/// let healer = EntityRef::new("Healer", "1");
/// assert!(engine.perform(&monster, "heal", &healer, Some(serde_json::json!({"amount": 10}))).unwrap());
/// assert!(!engine.perform(&monster, "heal", &healer, None).unwrap());
/// ```
#[derive(Debug)]
pub struct Engine<S = MemoryStore> {
    registry: Registry,
    log: InteractionLog<S>,
}

impl Engine<MemoryStore> {
    /// An engine that keeps its interactions in memory.
    pub fn in_memory(registry: Registry) -> Self {
        Self::new(registry, MemoryStore::new())
    }
}

impl<S: InteractionStore> Engine<S> {
    /// An engine over `registry` that records into `store`.
    pub fn new(registry: Registry, store: S) -> Self {
        Self {
            registry,
            log: InteractionLog::new(store),
        }
    }

    /// The registry of policies and hooks.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The interaction log.
    pub fn log(&self) -> &InteractionLog<S> {
        &self.log
    }

    /// Consume the engine, returning its store.
    pub fn into_store(self) -> S {
        self.log.into_store()
    }

    /// Evaluate whether `initiator` may perform `action` on `target`, and why not.
    pub fn evaluate(
        &self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
    ) -> Result<Decision, InteractError> {
        Ok(evaluate_detailed(&self.registry, &self.log, None, target, action, initiator)?.decision)
    }

    /// May `initiator` perform `action` on `target`?  Pure: records nothing, runs no hooks.
    pub fn can_perform(
        &self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
    ) -> Result<bool, InteractError> {
        Ok(self.evaluate(target, action, initiator)?.is_allowed())
    }

    /// Does the initiator rule alone admit `initiator`?  The log is not consulted.
    pub fn initiator_allowed(
        &self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
    ) -> Result<bool, UnknownActionError> {
        let policy = self.registry.lookup(&target.entity_ref().kind, action)?;
        Ok(policy.initiator_allowed(target, initiator))
    }

    /// Have `initiator` perform `action` on `target`.
    ///
    /// Returns true iff the interaction was recorded.  A refusal by the policy or a veto by a
    /// before-hook is `Ok(false)`, not an error.
    pub fn perform(
        &mut self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
        params: Option<serde_json::Value>,
    ) -> Result<bool, InteractError> {
        Ok(self
            .try_perform(target, action, initiator, params)?
            .is_recorded())
    }

    /// Like [`perform`](Self::perform), but report why an interaction was not recorded.
    pub fn try_perform(
        &mut self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
        params: Option<serde_json::Value>,
    ) -> Result<Outcome, InteractError> {
        perform(
            &self.registry,
            &mut self.log,
            None,
            target,
            action,
            initiator,
            params,
        )
    }

    /// Operations bound to one (entity type, action).
    pub fn action(
        &mut self,
        entity_type: &str,
        action: &str,
    ) -> Result<ActionHandle<'_, S>, UnknownActionError> {
        self.registry.lookup(entity_type, action)?;
        Ok(ActionHandle {
            engine: self,
            entity_type: entity_type.to_string(),
            action: action.to_string(),
        })
    }

    /// Start a unit of work whose accepted interactions are held until committed.
    pub fn unit_of_work(&mut self) -> UnitOfWork<'_, S> {
        UnitOfWork {
            engine: self,
            pending: PendingInteractions::default(),
        }
    }
}

fn perform<S: InteractionStore>(
    registry: &Registry,
    log: &mut InteractionLog<S>,
    pending: Option<&mut PendingInteractions>,
    target: &dyn Entity,
    action: &str,
    initiator: &dyn Entity,
    params: Option<serde_json::Value>,
) -> Result<Outcome, InteractError> {
    let evaluation = evaluate_detailed(
        registry,
        log,
        pending.as_deref(),
        target,
        action,
        initiator,
    )?;
    if !evaluation.decision.is_allowed() {
        return Ok(Outcome::Denied(evaluation.decision));
    }
    let target_ref = target.entity_ref();
    let initiator_ref = initiator.entity_ref();
    let ctx = HookContext {
        entity_type: &target_ref.kind,
        action,
        target,
        initiator,
        params: params.as_ref(),
        interaction: None,
    };
    if let Err(veto) = registry.hooks().run_before(&ctx) {
        return Ok(Outcome::Vetoed(veto));
    }
    let new = NewInteraction {
        initiator: initiator_ref,
        target: target_ref.clone(),
        action: action.to_string(),
        params: params.clone(),
    };
    let failed_append = InteractError::storage(StoragePhase::Append, &target_ref.kind, action);
    let interaction = match pending {
        Some(pending) => pending.stage(new, evaluation.only_once),
        None if evaluation.only_once => match log.append_unique(new).map_err(failed_append)? {
            Some(interaction) => interaction,
            None => return Ok(Outcome::Denied(Decision::AlreadyPerformed)),
        },
        None => log.append(new).map_err(failed_append)?,
    };
    tracing::info!(
        id = %interaction.id,
        action,
        target = %interaction.target,
        initiator = %interaction.initiator,
        "recorded interaction"
    );
    let ctx = HookContext {
        interaction: Some(&interaction),
        ..ctx
    };
    if let Err((index, error)) = registry.hooks().run_after(&ctx) {
        return Err(InteractError::AfterHook {
            entity_type: target_ref.kind.clone(),
            action: action.to_string(),
            index,
            error,
        });
    }
    Ok(Outcome::Recorded(interaction))
}

///////////////////////////////////////////// ActionHandle /////////////////////////////////////////

/// The operations of one (entity type, action) pair.
pub struct ActionHandle<'a, S> {
    engine: &'a mut Engine<S>,
    entity_type: String,
    action: String,
}

impl<S: InteractionStore> ActionHandle<'_, S> {
    /// The action this handle operates.
    pub fn action(&self) -> &str {
        &self.action
    }

    fn check_target(&self, target: &dyn Entity) -> Result<(), UnknownActionError> {
        let kind = target.entity_ref().kind;
        if kind != self.entity_type {
            return Err(UnknownActionError {
                entity_type: kind,
                action: self.action.clone(),
            });
        }
        Ok(())
    }

    /// May `initiator` perform this action on `target`?
    pub fn can_perform(
        &self,
        target: &dyn Entity,
        initiator: &dyn Entity,
    ) -> Result<bool, InteractError> {
        self.check_target(target)?;
        self.engine.can_perform(target, &self.action, initiator)
    }

    /// Does the initiator rule alone admit `initiator`?
    pub fn initiator_allowed(
        &self,
        target: &dyn Entity,
        initiator: &dyn Entity,
    ) -> Result<bool, UnknownActionError> {
        self.check_target(target)?;
        self.engine
            .initiator_allowed(target, &self.action, initiator)
    }

    /// Have `initiator` perform this action on `target`.
    pub fn perform(
        &mut self,
        target: &dyn Entity,
        initiator: &dyn Entity,
        params: Option<serde_json::Value>,
    ) -> Result<bool, InteractError> {
        self.check_target(target)?;
        self.engine.perform(target, &self.action, initiator, params)
    }
}

////////////////////////////////////////////// UnitOfWork //////////////////////////////////////////

/// A unit of work whose accepted interactions stay pending until [`commit`](Self::commit).
///
/// Only-once checks inside the unit see both the log and the pending interactions, so a second
/// accept of the same triple within one unit is refused.  Dropping the unit discards whatever
/// is pending.
///
/// After-hooks run when an interaction is staged, not when it is committed.  Their effects are
/// not undone if the unit is dropped or the interaction ends up in [`Commit::conflicts`].
pub struct UnitOfWork<'a, S: InteractionStore> {
    engine: &'a mut Engine<S>,
    pending: PendingInteractions,
}

/// The result of committing a unit of work.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Commit {
    /// Interactions written to the store, in acceptance order.
    pub committed: Vec<Interaction>,
    /// Only-once interactions the store refused because the triple was persisted in the
    /// meantime.
    pub conflicts: Vec<Interaction>,
}

impl<S: InteractionStore> UnitOfWork<'_, S> {
    /// May `initiator` perform `action` on `target`, counting pending interactions?
    pub fn can_perform(
        &self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
    ) -> Result<bool, InteractError> {
        Ok(evaluate_detailed(
            &self.engine.registry,
            &self.engine.log,
            Some(&self.pending),
            target,
            action,
            initiator,
        )?
        .decision
        .is_allowed())
    }

    /// Have `initiator` perform `action` on `target`, staging the record.
    ///
    /// Before- and after-hooks both run here against the staged interaction.  Returns true iff
    /// the interaction was staged; it reaches the store only on [`commit`](Self::commit).
    pub fn perform(
        &mut self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
        params: Option<serde_json::Value>,
    ) -> Result<bool, InteractError> {
        Ok(self
            .try_perform(target, action, initiator, params)?
            .is_recorded())
    }

    /// Like [`perform`](Self::perform), but report why an interaction was not staged.
    pub fn try_perform(
        &mut self,
        target: &dyn Entity,
        action: &str,
        initiator: &dyn Entity,
        params: Option<serde_json::Value>,
    ) -> Result<Outcome, InteractError> {
        perform(
            &self.engine.registry,
            &mut self.engine.log,
            Some(&mut self.pending),
            target,
            action,
            initiator,
            params,
        )
    }

    /// Interactions staged in this unit.
    pub fn pending(&self) -> &PendingInteractions {
        &self.pending
    }

    /// Persisted interactions on `target` followed by the pending ones.
    pub fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError> {
        let mut interactions = self.engine.log.list_by_target(target)?;
        interactions.extend(self.pending.list_by_target(target));
        Ok(interactions)
    }

    /// Write every pending interaction to the store, in acceptance order.
    ///
    /// On a storage failure the interactions written before it stay written; the rest are
    /// discarded.  After-hooks already ran when each interaction was staged and are not rerun,
    /// so their effects stand even for interactions reported in [`Commit::conflicts`].
    pub fn commit(mut self) -> Result<Commit, InteractError> {
        let mut commit = Commit::default();
        for staged in self.pending.drain() {
            let written = self
                .engine
                .log
                .commit(&staged.interaction, staged.unique)
                .map_err(InteractError::storage(
                    StoragePhase::Commit,
                    &staged.interaction.target.kind,
                    &staged.interaction.action,
                ))?;
            if written {
                commit.committed.push(staged.interaction);
            } else {
                tracing::warn!(
                    id = %staged.interaction.id,
                    action = %staged.interaction.action,
                    target = %staged.interaction.target,
                    initiator = %staged.interaction.initiator,
                    "only-once interaction already persisted; not committed"
                );
                commit.conflicts.push(staged.interaction);
            }
        }
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{hook, HookAction, HookError, InitiatorRule, PolicyConfig};

    fn monster_registry() -> Registry {
        let mut registry = Registry::default();
        registry
            .register(
                "Monster",
                PolicyConfig::new("heal")
                    .with(InitiatorRule::of_type("Healer"))
                    .only_once(true),
            )
            .unwrap();
        registry
            .register("Monster", PolicyConfig::new("poke"))
            .unwrap();
        registry
    }

    #[test]
    fn try_perform_reports_denials() {
        let mut engine = Engine::in_memory(monster_registry());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        let warrior = EntityRef::new("Warrior", "1");
        let outcome = engine.try_perform(&monster, "heal", &warrior, None).unwrap();
        assert_eq!(Outcome::Denied(Decision::InitiatorRejected), outcome);
        let outcome = engine.try_perform(&monster, "heal", &healer, None).unwrap();
        assert!(outcome.is_recorded());
        assert_eq!("heal", outcome.interaction().unwrap().action);
        let outcome = engine.try_perform(&monster, "heal", &healer, None).unwrap();
        assert_eq!(Outcome::Denied(Decision::AlreadyPerformed), outcome);
        assert_eq!(1, engine.log().count_by_target(&monster).unwrap());
    }

    #[test]
    fn params_are_recorded() {
        let mut engine = Engine::in_memory(monster_registry());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        engine
            .perform(
                &monster,
                "heal",
                &healer,
                Some(serde_json::json! {{"amount": 10}}),
            )
            .unwrap();
        let recorded = engine.log().list_by_target(&monster).unwrap();
        assert_eq!(
            Some(serde_json::json! {{"amount": 10}}),
            recorded[0].params
        );
        assert_eq!(healer, recorded[0].initiator);
    }

    #[test]
    fn denied_runs_no_hooks() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = monster_registry();
        registry
            .before(
                "Monster",
                "heal",
                hook(move |_| {
                    *counter.lock().unwrap() += 1;
                    Ok(HookAction::Continue)
                }),
            )
            .unwrap();
        let mut engine = Engine::in_memory(registry);
        let monster = EntityRef::new("Monster", "1");
        assert!(!engine
            .perform(&monster, "heal", &EntityRef::new("Warrior", "1"), None)
            .unwrap());
        assert_eq!(0, *calls.lock().unwrap());
    }

    #[test]
    fn after_hooks_see_the_record() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&seen);
        let mut registry = monster_registry();
        registry
            .after(
                "Monster",
                "poke",
                hook(move |ctx| {
                    let interaction = ctx.interaction.ok_or_else(|| HookError::new("no record"))?;
                    sink.lock().unwrap().push(interaction.id);
                    Ok(HookAction::Continue)
                }),
            )
            .unwrap();
        let mut engine = Engine::in_memory(registry);
        let monster = EntityRef::new("Monster", "1");
        let outcome = engine
            .try_perform(&monster, "poke", &EntityRef::new("Warrior", "1"), None)
            .unwrap();
        assert_eq!(vec![outcome.interaction().unwrap().id], *seen.lock().unwrap());
    }

    #[test]
    fn after_hook_failure_keeps_the_record() {
        let mut registry = monster_registry();
        registry
            .after(
                "Monster",
                "poke",
                hook(|_| Err(HookError::new("mailer down"))),
            )
            .unwrap();
        let mut engine = Engine::in_memory(registry);
        let monster = EntityRef::new("Monster", "1");
        let err = engine
            .perform(&monster, "poke", &EntityRef::new("Warrior", "1"), None)
            .unwrap_err();
        assert!(matches!(err, InteractError::AfterHook { index: 0, .. }));
        assert_eq!(1, engine.log().count_by_target(&monster).unwrap());
    }

    #[test]
    fn initiator_allowed_ignores_the_log() {
        let mut engine = Engine::in_memory(monster_registry());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        assert!(engine.perform(&monster, "heal", &healer, None).unwrap());
        assert!(!engine.can_perform(&monster, "heal", &healer).unwrap());
        assert!(engine.initiator_allowed(&monster, "heal", &healer).unwrap());
        assert!(engine.initiator_allowed(&monster, "tickle", &healer).is_err());
    }

    #[test]
    fn action_handle() {
        let mut engine = Engine::in_memory(monster_registry());
        assert!(engine.action("Monster", "tickle").is_err());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        let mut heal = engine.action("Monster", "heal").unwrap();
        assert_eq!("heal", heal.action());
        assert!(heal.can_perform(&monster, &healer).unwrap());
        assert!(heal.perform(&monster, &healer, None).unwrap());
        assert!(!heal.perform(&monster, &healer, None).unwrap());
        assert!(heal.initiator_allowed(&monster, &healer).unwrap());
        let err = heal
            .perform(&EntityRef::new("Healer", "2"), &healer, None)
            .unwrap_err();
        assert!(matches!(err, InteractError::UnknownAction(_)));
    }

    #[test]
    fn unit_of_work_guards_duplicates_before_commit() {
        let mut engine = Engine::in_memory(monster_registry());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        let mut unit = engine.unit_of_work();
        assert!(unit.can_perform(&monster, "heal", &healer).unwrap());
        assert!(unit.perform(&monster, "heal", &healer, None).unwrap());
        assert!(!unit.can_perform(&monster, "heal", &healer).unwrap());
        assert!(!unit.perform(&monster, "heal", &healer, None).unwrap());
        assert!(unit.perform(&monster, "poke", &healer, None).unwrap());
        assert_eq!(2, unit.pending().len());
        assert_eq!(2, unit.list_by_target(&monster).unwrap().len());
        let commit = unit.commit().unwrap();
        assert_eq!(2, commit.committed.len());
        assert!(commit.conflicts.is_empty());
        assert_eq!(2, engine.log().count_by_target(&monster).unwrap());
        assert!(!engine.can_perform(&monster, "heal", &healer).unwrap());
    }

    #[test]
    fn dropped_unit_of_work_writes_nothing() {
        let mut engine = Engine::in_memory(monster_registry());
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        {
            let mut unit = engine.unit_of_work();
            assert!(unit.perform(&monster, "heal", &healer, None).unwrap());
        }
        assert_eq!(0, engine.log().count_by_target(&monster).unwrap());
        assert!(engine.can_perform(&monster, "heal", &healer).unwrap());
    }

    #[test]
    fn after_hooks_run_when_staged() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&seen);
        let mut registry = monster_registry();
        registry
            .after(
                "Monster",
                "heal",
                hook(move |ctx| {
                    let interaction = ctx.interaction.ok_or_else(|| HookError::new("no record"))?;
                    sink.lock().unwrap().push(interaction.id);
                    Ok(HookAction::Continue)
                }),
            )
            .unwrap();
        let mut engine = Engine::in_memory(registry);
        let monster = EntityRef::new("Monster", "1");
        let healer = EntityRef::new("Healer", "1");
        let staged = {
            let mut unit = engine.unit_of_work();
            let outcome = unit.try_perform(&monster, "heal", &healer, None).unwrap();
            assert_eq!(1, seen.lock().unwrap().len());
            outcome.interaction().unwrap().id
        };
        assert_eq!(vec![staged], *seen.lock().unwrap());
        assert_eq!(0, engine.log().count_by_target(&monster).unwrap());

        let mut unit = engine.unit_of_work();
        assert!(unit.perform(&monster, "heal", &healer, None).unwrap());
        assert_eq!(2, seen.lock().unwrap().len());
        let commit = unit.commit().unwrap();
        assert_eq!(1, commit.committed.len());
        assert_eq!(2, seen.lock().unwrap().len());
        assert_eq!(commit.committed[0].id, seen.lock().unwrap()[1]);
    }
}
