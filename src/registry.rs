//! The entity registry: per entity type, the policies of every declared action.

use std::collections::{BTreeMap, HashMap};

use crate::rule::RuleContext;
use crate::{
    ConfigurationError, EntityDecl, Hook, HookDispatcher, HookPhase, Policy, PolicyConfig,
    Predicate, UnknownActionError,
};

/// The operation names an action reserves on its entity type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DerivedOperations {
    /// Capability check: does the initiator rule admit the initiator?  (`can_A`)
    pub capability_check: String,
    /// Full check: capability plus repeatability.  (`can_A_by`)
    pub full_check: String,
    /// Perform the action.  (`A_by`)
    pub perform: String,
    /// Before-hook registration point.  (`before_A`)
    pub before: String,
    /// After-hook registration point.  (`after_A`)
    pub after: String,
}

impl DerivedOperations {
    /// The names reserved by `action`.
    pub fn for_action(action: &str) -> Self {
        Self {
            capability_check: format!("can_{action}"),
            full_check: format!("can_{action}_by"),
            perform: format!("{action}_by"),
            before: format!("before_{action}"),
            after: format!("after_{action}"),
        }
    }

    /// Every reserved name.
    pub fn names(&self) -> [&str; 5] {
        [
            &self.capability_check,
            &self.full_check,
            &self.perform,
            &self.before,
            &self.after,
        ]
    }
}

#[derive(Clone, Default)]
struct EntityPolicies {
    methods: HashMap<String, Predicate>,
    policies: BTreeMap<String, Policy>,
    // reserved name -> action that reserved it
    reserved: HashMap<String, String>,
}

/// Binds target entity types to their action policies, capability methods, and hooks.
///
/// Policies are compiled on registration and immutable afterwards.  All configuration errors
/// surface here, at setup time.
///
/// # Example
///
/// ```
/// use interactions::{InitiatorRule, PolicyConfig, Registry};
///
/// let mut registry = Registry::default();
/// registry
///     .register("Monster", PolicyConfig::new("heal").with(InitiatorRule::of_type("Healer")).only_once(true))
///     .unwrap();
/// assert!(registry.lookup("Monster", "heal").is_ok());
/// assert!(registry.lookup("Monster", "tickle").is_err());
/// ```
#[derive(Default)]
pub struct Registry {
    entities: HashMap<String, EntityPolicies>,
    hooks: HookDispatcher,
}

impl Registry {
    /// Define a named capability method on `entity_type` for rules to refer to.
    ///
    /// Methods must be defined before the policies that name them are registered.
    pub fn define_method<F>(
        &mut self,
        entity_type: &str,
        name: &str,
        method: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(&dyn crate::Entity, &dyn crate::Entity) -> bool + Send + Sync + 'static,
    {
        let entity = self.entities.entry(entity_type.to_string()).or_default();
        if let Some(action) = entity.reserved.get(name) {
            return Err(ConfigurationError::ReservedName {
                entity_type: entity_type.to_string(),
                name: name.to_string(),
                action: action.clone(),
            });
        }
        if entity.methods.contains_key(name) {
            return Err(ConfigurationError::DuplicateMethod {
                entity_type: entity_type.to_string(),
                method: name.to_string(),
            });
        }
        entity
            .methods
            .insert(name.to_string(), crate::rule::predicate(method));
        Ok(())
    }

    /// Compile `config` and register it for `entity_type`.
    ///
    /// Fails if the action is already registered, if a rule cannot be normalized, or if one of
    /// the action's derived operation names is already taken.
    pub fn register(
        &mut self,
        entity_type: &str,
        config: PolicyConfig,
    ) -> Result<&Policy, ConfigurationError> {
        let entity = self.entities.entry(entity_type.to_string()).or_default();
        if entity.policies.contains_key(&config.action) {
            return Err(ConfigurationError::DuplicateAction {
                entity_type: entity_type.to_string(),
                action: config.action,
            });
        }
        let ctx = RuleContext {
            entity_type,
            action: &config.action,
            methods: &entity.methods,
        };
        let initiator = config.initiator.compile(&ctx)?;
        let repeat = config.repeat.compile(&ctx)?;
        let derived = DerivedOperations::for_action(&config.action);
        for name in derived.names() {
            let holder = if entity.methods.contains_key(name) {
                Some(config.action.clone())
            } else {
                entity.reserved.get(name).cloned()
            };
            if let Some(action) = holder {
                return Err(ConfigurationError::ReservedName {
                    entity_type: entity_type.to_string(),
                    name: name.to_string(),
                    action,
                });
            }
        }
        for name in derived.names() {
            entity
                .reserved
                .insert(name.to_string(), config.action.clone());
        }
        tracing::debug!(entity_type, policy = %config, "registered interaction policy");
        let action = config.action.clone();
        let policy = Policy::new(entity_type.to_string(), config, initiator, repeat);
        Ok(entity.policies.entry(action).or_insert(policy))
    }

    /// Register every action of a declaration.  Returns the number of policies registered.
    ///
    /// Either every action is registered or, on the first error, none are.
    pub fn declare(&mut self, decl: &EntityDecl) -> Result<usize, ConfigurationError> {
        let configs = decl.policy_configs()?;
        let saved = self.entities.get(&decl.name).cloned();
        let mut count = 0;
        for config in configs {
            if let Err(err) = self.register(&decl.name, config) {
                match saved {
                    Some(entity) => self.entities.insert(decl.name.clone(), entity),
                    None => self.entities.remove(&decl.name),
                };
                return Err(err);
            }
            count += 1;
        }
        Ok(count)
    }

    /// The policy for `entity_type.action`.
    pub fn lookup(&self, entity_type: &str, action: &str) -> Result<&Policy, UnknownActionError> {
        self.entities
            .get(entity_type)
            .and_then(|entity| entity.policies.get(action))
            .ok_or_else(|| UnknownActionError {
                entity_type: entity_type.to_string(),
                action: action.to_string(),
            })
    }

    /// Every policy registered on `entity_type`, ordered by action.
    pub fn policies(&self, entity_type: &str) -> impl Iterator<Item = &Policy> {
        self.entities
            .get(entity_type)
            .into_iter()
            .flat_map(|entity| entity.policies.values())
    }

    /// Every entity type with at least one registered action, sorted.
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types = self
            .entities
            .iter()
            .filter(|(_, entity)| !entity.policies.is_empty())
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        types.sort();
        types
    }

    /// The operation names reserved by `entity_type.action`.
    pub fn derived_operations(
        &self,
        entity_type: &str,
        action: &str,
    ) -> Result<DerivedOperations, UnknownActionError> {
        self.lookup(entity_type, action)?;
        Ok(DerivedOperations::for_action(action))
    }

    /// Append a before-hook for `entity_type.action`.
    pub fn before(
        &mut self,
        entity_type: &str,
        action: &str,
        hook: Hook,
    ) -> Result<(), ConfigurationError> {
        self.add_hook(entity_type, action, HookPhase::Before, hook)
    }

    /// Append an after-hook for `entity_type.action`.
    pub fn after(
        &mut self,
        entity_type: &str,
        action: &str,
        hook: Hook,
    ) -> Result<(), ConfigurationError> {
        self.add_hook(entity_type, action, HookPhase::After, hook)
    }

    fn add_hook(
        &mut self,
        entity_type: &str,
        action: &str,
        phase: HookPhase,
        hook: Hook,
    ) -> Result<(), ConfigurationError> {
        if self.lookup(entity_type, action).is_err() {
            return Err(ConfigurationError::UnknownAction {
                entity_type: entity_type.to_string(),
                action: action.to_string(),
            });
        }
        self.hooks.register(entity_type, action, phase, hook);
        Ok(())
    }

    /// The hooks registered so far.
    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entity_type in self.entity_types() {
            let actions = self
                .policies(entity_type)
                .map(|p| p.config().to_string())
                .collect::<Vec<_>>();
            map.entry(&entity_type, &actions);
        }
        map.finish()
    }
}
