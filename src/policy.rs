use std::fmt;

use crate::{Entity, InitiatorRule, Predicate, RepeatRule};

/// The declared configuration of one action, before it is compiled into a [`Policy`].
///
/// # Example
///
/// ```
/// use interactions::{InitiatorRule, PolicyConfig, RepeatRule};
///
/// let config = PolicyConfig::new("heal")
///     .with(InitiatorRule::of_type("Healer"))
///     .only_once(RepeatRule::once());
/// assert_eq!("heal: with Healer @ once", config.to_string());
/// ```
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// The action this policy governs.
    pub action: String,
    /// Which initiators are capable of the action.
    pub initiator: InitiatorRule,
    /// Whether a prior interaction blocks a new one.  Defaults to repeatable.
    pub repeat: RepeatRule,
}

impl PolicyConfig {
    /// Start a policy for `action` that allows any initiator, repeatedly.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            initiator: InitiatorRule::Any,
            repeat: RepeatRule::default(),
        }
    }

    /// Set the initiator rule.
    pub fn with(mut self, initiator: InitiatorRule) -> Self {
        self.initiator = initiator;
        self
    }

    /// Set the repeatability rule.
    pub fn only_once(mut self, repeat: impl Into<RepeatRule>) -> Self {
        self.repeat = repeat.into();
        self
    }
}

impl fmt::Display for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: with {} @ {}", self.action, self.initiator, self.repeat)
    }
}

/// A compiled policy for one (entity type, action) pair.
///
/// Created once at registration and immutable afterwards.  Both rules have been normalized to
/// predicates; the declared forms are kept only for display.
#[derive(Clone)]
pub struct Policy {
    entity_type: String,
    config: PolicyConfig,
    initiator: Predicate,
    repeat: Predicate,
}

impl Policy {
    pub(crate) fn new(
        entity_type: String,
        config: PolicyConfig,
        initiator: Predicate,
        repeat: Predicate,
    ) -> Self {
        Self {
            entity_type,
            config,
            initiator,
            repeat,
        }
    }

    /// The target entity type this policy is registered on.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The action this policy governs.
    pub fn action(&self) -> &str {
        &self.config.action
    }

    /// The configuration this policy was compiled from.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluate the initiator rule.
    pub fn initiator_allowed(&self, target: &dyn Entity, initiator: &dyn Entity) -> bool {
        (self.initiator)(target, initiator)
    }

    /// Evaluate the repeatability rule.  True means only-once semantics apply.
    pub fn only_once(&self, target: &dyn Entity, initiator: &dyn Entity) -> bool {
        (self.repeat)(target, initiator)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("entity_type", &self.entity_type)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PolicyConfig::new("poke");
        assert!(matches!(config.initiator, InitiatorRule::Any));
        assert!(matches!(config.repeat, RepeatRule::Constant(false)));
        assert_eq!("poke: with any @ repeatable", config.to_string());
    }

    #[test]
    fn config_builder() {
        let config = PolicyConfig::new("damage")
            .with(InitiatorRule::one_of(["Warrior", "Mage"]))
            .only_once(true);
        assert_eq!("damage: with [Mage, Warrior] @ once", config.to_string());
    }
}
