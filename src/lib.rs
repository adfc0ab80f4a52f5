#![deny(missing_docs)]

//! Interactions: declarative policies for who may do what to whom, and how often.
//!
//! An entity type declares the actions it accepts.  For each action a policy says which
//! initiators are capable of it and whether the same initiator may repeat it on the same target.
//! Accepted interactions are appended to a log, and lifecycle hooks run around every accept.
//!
//! # Core Concepts
//!
//! - **Entity**: Anything with a type tag and an identity key
//! - **Policy**: An initiator rule and a repeatability rule for one (entity type, action)
//! - **Registry**: Every policy, capability method, and hook, fixed at setup time
//! - **InteractionLog**: The append-only record of accepted interactions
//! - **Engine**: Evaluates, runs hooks, and records
//!
//! # Example
//!
//! ```
//! use interactions::{Engine, EntityDecl, EntityRef, Registry};
//!
//! let mut registry = Registry::default();
//! registry
//!     .declare(&EntityDecl::parse("entity Monster { heal: with Healer @ once }").unwrap())
//!     .unwrap();
//! let mut engine = Engine::in_memory(registry);
//!
//! let monster = EntityRef::new("Monster", "1");
//! let healer = EntityRef::new("Healer", "1");
//! let warrior = EntityRef::new("Warrior", "1");
//! assert!(!engine.can_perform(&monster, "heal", &warrior).unwrap());
//! assert!(engine.perform(&monster, "heal", &healer, None).unwrap());
//! assert!(!engine.perform(&monster, "heal", &healer, None).unwrap());
//! ```

mod declaration;
mod engine;
mod entity;
mod errors;
mod evaluator;
mod hooks;
mod interaction;
mod jsonl_store;
mod log;
mod parser;
mod policy;
mod registry;
mod rule;
mod store;

pub use declaration::{ActionDecl, EntityDecl};
pub use engine::{ActionHandle, Commit, Engine, Outcome, UnitOfWork};
pub use entity::{Entity, EntityRef};
pub use errors::{
    ConfigurationError, HookError, InteractError, InvalidRuleError, RuleKind, StorageError,
    StoragePhase, UnknownActionError,
};
pub use evaluator::{evaluate, Decision};
pub use hooks::{hook, Hook, HookAction, HookContext, HookDispatcher, HookPhase, Veto};
pub use interaction::{Interaction, InteractionId, InteractionKey, NewInteraction};
pub use jsonl_store::JsonlStore;
pub use log::{InteractionLog, PendingInteractions};
pub use parser::{ParseError, Position};
pub use policy::{Policy, PolicyConfig};
pub use registry::{DerivedOperations, Registry};
pub use rule::{predicate, InitiatorRule, Predicate, RepeatRule};
pub use store::{InteractionStore, MemoryStore};
