//! The authorization evaluator: is an (initiator, target) pair admissible for an action?
//!
//! Evaluation first checks the initiator rule, then the repeatability rule.  It is pure: it
//! records nothing and fires no hooks.

use std::fmt;

use crate::log::exists_anywhere;
use crate::{
    Entity, InteractError, InteractionKey, InteractionLog, InteractionStore, PendingInteractions,
    Policy, Registry, StoragePhase,
};

/// The result of evaluating a policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Decision {
    /// The interaction is admissible.
    #[serde(rename = "allowed")]
    Allowed,
    /// The initiator rule rejected the initiator.
    #[serde(rename = "initiator_rejected")]
    InitiatorRejected,
    /// Only-once applies and the initiator already performed the action on the target.
    #[serde(rename = "already_performed")]
    AlreadyPerformed,
}

impl Decision {
    /// True iff the interaction is admissible.
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::InitiatorRejected => write!(f, "initiator rejected"),
            Decision::AlreadyPerformed => write!(f, "already performed"),
        }
    }
}

/// Evaluate `target`'s policy for `action` against `initiator`.
///
/// When `pending` is given, interactions accepted but not yet committed count as prior
/// interactions too.
pub fn evaluate<S: InteractionStore>(
    registry: &Registry,
    log: &InteractionLog<S>,
    pending: Option<&PendingInteractions>,
    target: &dyn Entity,
    action: &str,
    initiator: &dyn Entity,
) -> Result<Decision, InteractError> {
    Ok(evaluate_detailed(registry, log, pending, target, action, initiator)?.decision)
}

/// A decision together with whether only-once semantics applied to it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Evaluation {
    pub decision: Decision,
    pub only_once: bool,
}

pub(crate) fn evaluate_detailed<S: InteractionStore>(
    registry: &Registry,
    log: &InteractionLog<S>,
    pending: Option<&PendingInteractions>,
    target: &dyn Entity,
    action: &str,
    initiator: &dyn Entity,
) -> Result<Evaluation, InteractError> {
    let target_ref = target.entity_ref();
    let policy = registry.lookup(&target_ref.kind, action)?;
    let evaluation = decide(policy, log, pending, target, initiator)?;
    tracing::debug!(
        entity_type = %target_ref.kind,
        action,
        target = %target_ref,
        initiator = %initiator.entity_ref(),
        decision = %evaluation.decision,
        only_once = evaluation.only_once,
        "evaluated interaction policy"
    );
    Ok(evaluation)
}

fn decide<S: InteractionStore>(
    policy: &Policy,
    log: &InteractionLog<S>,
    pending: Option<&PendingInteractions>,
    target: &dyn Entity,
    initiator: &dyn Entity,
) -> Result<Evaluation, InteractError> {
    if !policy.initiator_allowed(target, initiator) {
        return Ok(Evaluation {
            decision: Decision::InitiatorRejected,
            only_once: false,
        });
    }
    if !policy.only_once(target, initiator) {
        return Ok(Evaluation {
            decision: Decision::Allowed,
            only_once: false,
        });
    }
    let key = InteractionKey {
        initiator: initiator.entity_ref(),
        target: target.entity_ref(),
        action: policy.action().to_string(),
    };
    let performed = exists_anywhere(log, pending, &key).map_err(InteractError::storage(
        StoragePhase::Evaluate,
        policy.entity_type(),
        policy.action(),
    ))?;
    let decision = if performed {
        Decision::AlreadyPerformed
    } else {
        Decision::Allowed
    };
    Ok(Evaluation {
        decision,
        only_once: true,
    })
}
