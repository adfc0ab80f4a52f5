//! Rule specifications and their normalization into predicates.
//!
//! A policy declares two rules.  Each is written in one of several forms and normalized exactly
//! once, at registration, into a [`Predicate`] over `(target, initiator)`.  Evaluation never
//! branches on the declared form again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::{Entity, InvalidRuleError, RuleKind};

/// A compiled rule: `(target, initiator) -> bool`.
pub type Predicate = Arc<dyn Fn(&dyn Entity, &dyn Entity) -> bool + Send + Sync>;

/// Wrap a closure as a [`Predicate`].
pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&dyn Entity, &dyn Entity) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Everything rule normalization may resolve against.
pub(crate) struct RuleContext<'a> {
    pub entity_type: &'a str,
    pub action: &'a str,
    pub methods: &'a HashMap<String, Predicate>,
}

impl RuleContext<'_> {
    fn invalid(&self, rule: RuleKind, spec: impl fmt::Display, reason: &str) -> InvalidRuleError {
        InvalidRuleError {
            entity_type: self.entity_type.to_string(),
            action: self.action.to_string(),
            rule,
            spec: spec.to_string(),
            reason: reason.to_string(),
        }
    }

    fn method(&self, rule: RuleKind, name: &str) -> Result<Predicate, InvalidRuleError> {
        self.methods.get(name).cloned().ok_or_else(|| {
            self.invalid(
                rule,
                format!("method {name}"),
                "no capability method with this name is defined on the entity type",
            )
        })
    }
}

/////////////////////////////////////////// InitiatorRule //////////////////////////////////////////

/// Which initiators are capable of performing an action.
#[derive(Clone)]
pub enum InitiatorRule {
    /// Every initiator.
    Any,
    /// Initiators whose type is, or is a recognized subtype of, the named type.
    Type(String),
    /// Initiators whose runtime type is exactly one of the named types.
    TypeSet(BTreeSet<String>),
    /// Delegate to a capability method defined on the target's entity type.
    Method(String),
    /// An arbitrary predicate over `(target, initiator)`.
    Predicate(Predicate),
}

impl InitiatorRule {
    /// Allow every initiator.
    pub fn any() -> Self {
        Self::Any
    }

    /// Allow initiators of the given type (or its recognized subtypes).
    pub fn of_type(kind: impl Into<String>) -> Self {
        Self::Type(kind.into())
    }

    /// Allow initiators whose type is one of the given types.
    pub fn one_of<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::TypeSet(kinds.into_iter().map(Into::into).collect())
    }

    /// Delegate to the named capability method of the target's entity type.
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    /// Decide with an arbitrary predicate over `(target, initiator)`.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&dyn Entity, &dyn Entity) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(predicate(f))
    }

    pub(crate) fn compile(&self, ctx: &RuleContext<'_>) -> Result<Predicate, InvalidRuleError> {
        match self {
            InitiatorRule::Any => Ok(predicate(|_, _| true)),
            InitiatorRule::Type(kind) => {
                if let Some(reason) = bad_type_name(kind) {
                    return Err(ctx.invalid(RuleKind::Initiator, self, reason));
                }
                let kind = kind.clone();
                Ok(predicate(move |_, initiator| initiator.is_a(&kind)))
            }
            InitiatorRule::TypeSet(kinds) => {
                if kinds.is_empty() {
                    return Err(ctx.invalid(
                        RuleKind::Initiator,
                        self,
                        "an empty type set matches no initiator",
                    ));
                }
                if let Some(reason) = kinds.iter().find_map(|kind| bad_type_name(kind)) {
                    return Err(ctx.invalid(RuleKind::Initiator, self, reason));
                }
                let kinds = kinds.clone();
                Ok(predicate(move |_, initiator| {
                    kinds.contains(&initiator.entity_ref().kind)
                }))
            }
            InitiatorRule::Method(name) => ctx.method(RuleKind::Initiator, name),
            InitiatorRule::Predicate(p) => Ok(Arc::clone(p)),
        }
    }
}

fn bad_type_name(kind: &str) -> Option<&'static str> {
    match kind {
        "" => Some("type name is empty"),
        "any" => Some("\"any\" names the any-initiator rule, not a type"),
        _ => None,
    }
}

impl fmt::Display for InitiatorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitiatorRule::Any => write!(f, "any"),
            InitiatorRule::Type(kind) => write!(f, "{kind}"),
            InitiatorRule::TypeSet(kinds) => {
                write!(f, "[")?;
                for (idx, kind) in kinds.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{kind}")?;
                }
                write!(f, "]")
            }
            InitiatorRule::Method(name) => write!(f, "method {name}"),
            InitiatorRule::Predicate(_) => write!(f, "<predicate>"),
        }
    }
}

impl fmt::Debug for InitiatorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InitiatorRule({self})")
    }
}

///////////////////////////////////////////// RepeatRule ///////////////////////////////////////////

/// Whether a prior interaction of the same kind blocks a new one.
///
/// A rule that evaluates to true requests only-once semantics.
#[derive(Clone)]
pub enum RepeatRule {
    /// Always only-once (`true`) or always repeatable (`false`).
    Constant(bool),
    /// Delegate to a capability method defined on the target's entity type.
    Method(String),
    /// An arbitrary predicate over `(target, initiator)`.
    Predicate(Predicate),
}

impl Default for RepeatRule {
    fn default() -> Self {
        Self::Constant(false)
    }
}

impl From<bool> for RepeatRule {
    fn from(only_once: bool) -> Self {
        Self::Constant(only_once)
    }
}

impl RepeatRule {
    /// Each initiator may perform the action on a target at most once.
    pub fn once() -> Self {
        Self::Constant(true)
    }

    /// The action may be repeated freely.
    pub fn repeatable() -> Self {
        Self::Constant(false)
    }

    /// Delegate to the named capability method of the target's entity type.
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    /// Decide with an arbitrary predicate over `(target, initiator)`.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&dyn Entity, &dyn Entity) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(predicate(f))
    }

    pub(crate) fn compile(&self, ctx: &RuleContext<'_>) -> Result<Predicate, InvalidRuleError> {
        match self {
            RepeatRule::Constant(only_once) => {
                let only_once = *only_once;
                Ok(predicate(move |_, _| only_once))
            }
            RepeatRule::Method(name) => ctx.method(RuleKind::Repeatability, name),
            RepeatRule::Predicate(p) => Ok(Arc::clone(p)),
        }
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatRule::Constant(true) => write!(f, "once"),
            RepeatRule::Constant(false) => write!(f, "repeatable"),
            RepeatRule::Method(name) => write!(f, "method {name}"),
            RepeatRule::Predicate(_) => write!(f, "<predicate>"),
        }
    }
}

impl fmt::Debug for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepeatRule({self})")
    }
}
