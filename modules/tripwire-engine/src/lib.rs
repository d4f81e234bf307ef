//! Event-condition-action dispatch engine.
//!
//! Callers publish events; rules registered on the engine decide, per event,
//! whether to fire based on their conditions; a fired rule runs its ordered
//! action bindings against a shared mutable `Context`. Middleware wraps the
//! whole dispatch.
//!
//! Consumers plug in behavior by implementing `Action` (side effects),
//! `Condition` (pure predicates), `Listener` (rule-less subscribers) and
//! `Middleware` (around-dispatch layers), or by registering closures.

pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod result;
pub mod rule;
pub mod settings;
pub mod traits;

pub use condition::{CompareOp, FieldCondition, PredicateCondition};
pub use config::{DuplicateRulePolicy, EngineConfig};
pub use context::Context;
pub use engine::{DiagnosticSink, Engine};
pub use error::EngineError;
pub use middleware::{GuardMiddleware, InlineMiddleware, Next, TimingMiddleware};
pub use result::{ActionFailure, EngineResult, RuleResult};
pub use rule::{ActionBinding, MatchMode, Rule, RuleBuilder};
pub use settings::ActionSettings;
pub use traits::{Action, ActionFn, Condition, Listener, ListenerFn, Middleware};
pub use tripwire_events::Event;
