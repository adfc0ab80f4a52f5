//! Lifecycle hooks run around the acceptance of an interaction.
//!
//! Before-hooks run in registration order and may veto; a vetoed accept writes nothing.
//! After-hooks run in registration order once the record is written.  The dispatcher performs no
//! rollback of hook side effects.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Entity, HookError, Interaction};

/// What a hook sees.
pub struct HookContext<'a> {
    /// The target's entity type.
    pub entity_type: &'a str,
    /// The action being performed.
    pub action: &'a str,
    /// The target of the interaction.
    pub target: &'a dyn Entity,
    /// The initiator of the interaction.
    pub initiator: &'a dyn Entity,
    /// The payload passed to perform.
    pub params: Option<&'a serde_json::Value>,
    /// The recorded interaction.  Present only for after-hooks.
    pub interaction: Option<&'a Interaction>,
}

/// What a hook wants to happen next.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HookAction {
    /// Proceed with the accept.
    Continue,
    /// Reject the accept (before-hooks only; ignored after the record is written).
    Veto {
        /// Why the hook rejected the interaction.
        reason: String,
    },
}

impl HookAction {
    /// Create a veto.
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto {
            reason: reason.into(),
        }
    }
}

/// A lifecycle hook.
pub type Hook = Arc<dyn Fn(&HookContext<'_>) -> Result<HookAction, HookError> + Send + Sync>;

/// Wrap a closure as a [`Hook`].
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(&HookContext<'_>) -> Result<HookAction, HookError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// When a hook runs relative to recording the interaction.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum HookPhase {
    /// Before the record is written; may veto.
    Before,
    /// After the record is written.
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => write!(f, "before"),
            HookPhase::After => write!(f, "after"),
        }
    }
}

/// Why a before-hook stopped an accept.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Veto {
    /// Position of the vetoing hook in registration order.
    pub index: usize,
    /// The reason given, or the failure raised.
    pub reason: String,
    /// True if the hook raised a failure rather than returning a veto.
    pub failed: bool,
}

#[derive(Default)]
struct ActionHooks {
    before: Vec<Hook>,
    after: Vec<Hook>,
}

/// Ordered before/after hooks keyed by (entity type, action).
#[derive(Default)]
pub struct HookDispatcher {
    hooks: HashMap<(String, String), ActionHooks>,
}

impl HookDispatcher {
    /// Append a hook for `phase` of `entity_type.action`.  Later registrations run later.
    pub fn register(&mut self, entity_type: &str, action: &str, phase: HookPhase, hook: Hook) {
        let hooks = self
            .hooks
            .entry((entity_type.to_string(), action.to_string()))
            .or_default();
        match phase {
            HookPhase::Before => hooks.before.push(hook),
            HookPhase::After => hooks.after.push(hook),
        }
    }

    /// Number of hooks registered for `phase` of `entity_type.action`.
    pub fn count(&self, entity_type: &str, action: &str, phase: HookPhase) -> usize {
        self.get(entity_type, action)
            .map(|hooks| match phase {
                HookPhase::Before => hooks.before.len(),
                HookPhase::After => hooks.after.len(),
            })
            .unwrap_or(0)
    }

    fn get(&self, entity_type: &str, action: &str) -> Option<&ActionHooks> {
        let key = (entity_type.to_string(), action.to_string());
        self.hooks.get(&key)
    }

    /// Run every before-hook in order, stopping at the first veto or failure.
    pub fn run_before(&self, ctx: &HookContext<'_>) -> Result<(), Veto> {
        let Some(hooks) = self.get(ctx.entity_type, ctx.action) else {
            return Ok(());
        };
        for (index, hook) in hooks.before.iter().enumerate() {
            match hook(ctx) {
                Ok(HookAction::Continue) => {}
                Ok(HookAction::Veto { reason }) => {
                    tracing::debug!(
                        entity_type = ctx.entity_type,
                        action = ctx.action,
                        index,
                        reason = %reason,
                        "before hook vetoed interaction"
                    );
                    return Err(Veto {
                        index,
                        reason,
                        failed: false,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        entity_type = ctx.entity_type,
                        action = ctx.action,
                        index,
                        error = %err,
                        "before hook failed; rejecting interaction"
                    );
                    return Err(Veto {
                        index,
                        reason: err.message,
                        failed: true,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run every after-hook in order, stopping at the first failure.
    ///
    /// A veto returned after the record is written has nothing to reject and is ignored.
    pub fn run_after(&self, ctx: &HookContext<'_>) -> Result<(), (usize, HookError)> {
        let Some(hooks) = self.get(ctx.entity_type, ctx.action) else {
            return Ok(());
        };
        for (index, hook) in hooks.after.iter().enumerate() {
            match hook(ctx) {
                Ok(HookAction::Continue) => {}
                Ok(HookAction::Veto { reason }) => {
                    tracing::warn!(
                        entity_type = ctx.entity_type,
                        action = ctx.action,
                        index,
                        reason = %reason,
                        "after hook returned a veto; the interaction is already recorded"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        entity_type = ctx.entity_type,
                        action = ctx.action,
                        index,
                        error = %err,
                        "after hook failed"
                    );
                    return Err((index, err));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((entity_type, action), hooks) in self.hooks.iter() {
            map.entry(
                &format!("{entity_type}.{action}"),
                &(hooks.before.len(), hooks.after.len()),
            );
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::EntityRef;

    fn recorder(trace: &Arc<Mutex<Vec<String>>>, name: &str, action: HookAction) -> Hook {
        let trace = Arc::clone(trace);
        let name = name.to_string();
        hook(move |_| {
            trace.lock().unwrap().push(name.clone());
            Ok(action.clone())
        })
    }

    fn with_context<T>(f: impl FnOnce(&HookContext<'_>) -> T) -> T {
        let target = EntityRef::new("Monster", "1");
        let initiator = EntityRef::new("Healer", "1");
        let ctx = HookContext {
            entity_type: "Monster",
            action: "heal",
            target: &target,
            initiator: &initiator,
            params: None,
            interaction: None,
        };
        f(&ctx)
    }

    #[test]
    fn before_runs_in_registration_order() {
        let trace = Arc::new(Mutex::new(vec![]));
        let mut hooks = HookDispatcher::default();
        for name in ["a", "b", "c"] {
            hooks.register(
                "Monster",
                "heal",
                HookPhase::Before,
                recorder(&trace, name, HookAction::Continue),
            );
        }
        assert_eq!(3, hooks.count("Monster", "heal", HookPhase::Before));
        assert_eq!(0, hooks.count("Monster", "heal", HookPhase::After));
        assert!(with_context(|ctx| hooks.run_before(ctx)).is_ok());
        assert_eq!(vec!["a", "b", "c"], *trace.lock().unwrap());
    }

    #[test]
    fn veto_stops_the_chain() {
        let trace = Arc::new(Mutex::new(vec![]));
        let mut hooks = HookDispatcher::default();
        hooks.register(
            "Monster",
            "heal",
            HookPhase::Before,
            recorder(&trace, "a", HookAction::Continue),
        );
        hooks.register(
            "Monster",
            "heal",
            HookPhase::Before,
            recorder(&trace, "b", HookAction::veto("full health")),
        );
        hooks.register(
            "Monster",
            "heal",
            HookPhase::Before,
            recorder(&trace, "c", HookAction::Continue),
        );
        let veto = with_context(|ctx| hooks.run_before(ctx)).unwrap_err();
        assert_eq!(
            Veto {
                index: 1,
                reason: "full health".to_string(),
                failed: false,
            },
            veto
        );
        assert_eq!(vec!["a", "b"], *trace.lock().unwrap());
    }

    #[test]
    fn failure_is_a_veto_before() {
        let mut hooks = HookDispatcher::default();
        hooks.register(
            "Monster",
            "heal",
            HookPhase::Before,
            hook(|_| Err(HookError::new("mana exhausted"))),
        );
        let veto = with_context(|ctx| hooks.run_before(ctx)).unwrap_err();
        assert!(veto.failed);
        assert_eq!("mana exhausted", veto.reason);
    }

    #[test]
    fn after_failure_propagates() {
        let trace = Arc::new(Mutex::new(vec![]));
        let mut hooks = HookDispatcher::default();
        hooks.register(
            "Monster",
            "heal",
            HookPhase::After,
            recorder(&trace, "a", HookAction::veto("too late")),
        );
        hooks.register(
            "Monster",
            "heal",
            HookPhase::After,
            hook(|_| Err(HookError::new("notify failed"))),
        );
        hooks.register(
            "Monster",
            "heal",
            HookPhase::After,
            recorder(&trace, "c", HookAction::Continue),
        );
        let (index, err) = with_context(|ctx| hooks.run_after(ctx)).unwrap_err();
        assert_eq!(1, index);
        assert_eq!("notify failed", err.message);
        assert_eq!(vec!["a"], *trace.lock().unwrap());
    }

    #[test]
    fn hooks_are_keyed_by_entity_type_and_action() {
        let trace = Arc::new(Mutex::new(vec![]));
        let mut hooks = HookDispatcher::default();
        hooks.register(
            "Monster",
            "damage",
            HookPhase::Before,
            recorder(&trace, "damage", HookAction::veto("no")),
        );
        hooks.register(
            "Healer",
            "heal",
            HookPhase::Before,
            recorder(&trace, "healer", HookAction::veto("no")),
        );
        assert!(with_context(|ctx| hooks.run_before(ctx)).is_ok());
        assert!(trace.lock().unwrap().is_empty());
    }
}
