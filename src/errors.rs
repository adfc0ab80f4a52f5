use crate::ParseError;

///////////////////////////////////////////// RuleKind /////////////////////////////////////////////

/// Which of a policy's two rules an error refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum RuleKind {
    /// The rule deciding whether an initiator is capable of the action.
    #[serde(rename = "initiator")]
    Initiator,
    /// The rule deciding whether a prior interaction blocks a new one.
    #[serde(rename = "repeatability")]
    Repeatability,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Initiator => write!(f, "initiator"),
            RuleKind::Repeatability => write!(f, "repeatability"),
        }
    }
}

////////////////////////////////////////// InvalidRuleError ////////////////////////////////////////

/// A rule specification that does not match any recognized form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidRuleError {
    /// The entity type the policy was being registered on.
    pub entity_type: String,
    /// The action the policy governs.
    pub action: String,
    /// Which rule failed to normalize.
    pub rule: RuleKind,
    /// The offending specification, rendered as text.
    pub spec: String,
    /// Why the specification was rejected.
    pub reason: String,
}

impl std::fmt::Display for InvalidRuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expected = match self.rule {
            RuleKind::Initiator => "\"any\", a type name, an array of type names, a method, or a predicate",
            RuleKind::Repeatability => "true, false, a method, or a predicate",
        };
        write!(
            f,
            "invalid {} rule for {}.{}: {}: got {}\nSuggestion: Expected {expected}",
            self.rule, self.entity_type, self.action, self.reason, self.spec
        )
    }
}

impl std::error::Error for InvalidRuleError {}

///////////////////////////////////////// ConfigurationError ///////////////////////////////////////

/// Errors raised while registering policies.  These are fatal at setup time.
#[derive(Clone, Debug)]
pub enum ConfigurationError {
    /// The action is already registered for the entity type.
    DuplicateAction {
        /// The entity type.
        entity_type: String,
        /// The action registered twice.
        action: String,
    },
    /// A name collides with one of the operation names derived from a registered action.
    ReservedName {
        /// The entity type.
        entity_type: String,
        /// The colliding name.
        name: String,
        /// The action that reserves the name.
        action: String,
    },
    /// A capability method is already defined for the entity type.
    DuplicateMethod {
        /// The entity type.
        entity_type: String,
        /// The method defined twice.
        method: String,
    },
    /// Hooks were attached to an action that was never registered.
    UnknownAction {
        /// The entity type.
        entity_type: String,
        /// The action named by the hook.
        action: String,
    },
    /// A rule could not be normalized into a predicate.
    InvalidRule(InvalidRuleError),
    /// A textual declaration could not be parsed.
    Parse(ParseError),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::DuplicateAction {
                entity_type,
                action,
            } => {
                write!(f, "action '{action}' is already registered for {entity_type}\nSuggestion: List each action once per entity type")
            }
            ConfigurationError::ReservedName {
                entity_type,
                name,
                action,
            } => {
                write!(f, "'{name}' on {entity_type} is reserved by action '{action}'\nSuggestion: Rename the capability method or the action")
            }
            ConfigurationError::DuplicateMethod {
                entity_type,
                method,
            } => {
                write!(f, "method '{method}' is already defined for {entity_type}")
            }
            ConfigurationError::UnknownAction {
                entity_type,
                action,
            } => {
                write!(f, "cannot attach hooks to {entity_type}.{action}: action is not registered\nSuggestion: Register the action before its hooks")
            }
            ConfigurationError::InvalidRule(err) => write!(f, "{err}"),
            ConfigurationError::Parse(err) => write!(f, "declaration parse error {err}"),
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::InvalidRule(err) => Some(err),
            ConfigurationError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidRuleError> for ConfigurationError {
    fn from(err: InvalidRuleError) -> Self {
        Self::InvalidRule(err)
    }
}

impl From<ParseError> for ConfigurationError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

///////////////////////////////////////// UnknownActionError ///////////////////////////////////////

/// Evaluation or perform was requested for an action never registered on the target's type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownActionError {
    /// The target's entity type.
    pub entity_type: String,
    /// The requested action.
    pub action: String,
}

impl std::fmt::Display for UnknownActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown action '{}' for entity type {}",
            self.action, self.entity_type
        )
    }
}

impl std::error::Error for UnknownActionError {}

//////////////////////////////////////////// StorageError //////////////////////////////////////////

/// A persistence failure surfaced by an interaction store.
#[derive(Debug)]
pub enum StorageError {
    /// The underlying I/O failed.
    Io(std::io::Error),
    /// A record could not be serialized or deserialized.
    Serialization(serde_json::Error),
    /// A persisted record is malformed.
    Corrupt {
        /// The 1-based line (or record) number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },
    /// A store-specific failure.
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Create a Backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "storage I/O error: {err}"),
            StorageError::Serialization(err) => write!(f, "storage serialization error: {err}"),
            StorageError::Corrupt { line, message } => {
                write!(f, "corrupt interaction record at line {line}: {message}")
            }
            StorageError::Backend { message } => write!(f, "storage error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

///////////////////////////////////////////// StoragePhase /////////////////////////////////////////

/// Where in evaluation or perform a store was being used when it failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum StoragePhase {
    /// Looking up prior interactions for an only-once check.
    #[serde(rename = "evaluate")]
    Evaluate,
    /// Appending an accepted interaction.
    #[serde(rename = "append")]
    Append,
    /// Writing a staged interaction while committing a unit of work.
    #[serde(rename = "commit")]
    Commit,
}

impl std::fmt::Display for StoragePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoragePhase::Evaluate => write!(f, "evaluate"),
            StoragePhase::Append => write!(f, "append"),
            StoragePhase::Commit => write!(f, "commit"),
        }
    }
}

///////////////////////////////////////////// HookError ////////////////////////////////////////////

/// A failure raised by a lifecycle hook.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HookError {
    /// Description of the failure.
    pub message: String,
}

impl HookError {
    /// Create a new hook failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HookError {}

/////////////////////////////////////////// InteractError //////////////////////////////////////////

/// Errors surfaced by evaluation and perform.
///
/// A before-hook veto is not an error; it is a negative outcome of perform.
#[derive(Debug)]
pub enum InteractError {
    /// The action is not registered on the target's type.
    UnknownAction(UnknownActionError),
    /// The interaction store failed.
    Storage {
        /// The target's entity type.
        entity_type: String,
        /// The action being evaluated or performed.
        action: String,
        /// What the store was doing.
        phase: StoragePhase,
        /// The failure the store reported.
        error: StorageError,
    },
    /// An after-hook failed.  The interaction was already recorded and is not retracted.
    AfterHook {
        /// The target's entity type.
        entity_type: String,
        /// The action performed.
        action: String,
        /// Position of the failing hook in registration order.
        index: usize,
        /// The failure the hook raised.
        error: HookError,
    },
}

impl std::fmt::Display for InteractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractError::UnknownAction(err) => write!(f, "{err}"),
            InteractError::Storage {
                entity_type,
                action,
                phase,
                error,
            } => {
                write!(f, "{phase} of {entity_type}.{action} failed: {error}")
            }
            InteractError::AfterHook {
                entity_type,
                action,
                index,
                error,
            } => {
                write!(f, "after hook #{index} for {entity_type}.{action} failed: {error}\nThe interaction was recorded before the hook ran")
            }
        }
    }
}

impl std::error::Error for InteractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InteractError::UnknownAction(err) => Some(err),
            InteractError::Storage { error, .. } => Some(error),
            InteractError::AfterHook { error, .. } => Some(error),
        }
    }
}

impl From<UnknownActionError> for InteractError {
    fn from(err: UnknownActionError) -> Self {
        Self::UnknownAction(err)
    }
}

impl InteractError {
    pub(crate) fn storage<'a>(
        phase: StoragePhase,
        entity_type: &'a str,
        action: &'a str,
    ) -> impl FnOnce(StorageError) -> Self + 'a {
        move |error| Self::Storage {
            entity_type: entity_type.to_string(),
            action: action.to_string(),
            phase,
            error,
        }
    }
}
