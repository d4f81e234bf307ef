//! Capabilities the engine invokes.

use anyhow::Result;
use async_trait::async_trait;
use tripwire_events::Event;

use crate::context::Context;
use crate::middleware::Next;
use crate::settings::ActionSettings;

/// A side-effecting handler, resolved by `action_type` when a rule fires.
///
/// Returning `Err` abandons the remaining actions of the current rule only;
/// sibling rules keep running.
#[async_trait]
pub trait Action: Send + Sync {
    fn action_type(&self) -> &str;

    async fn execute(&self, context: &mut Context, settings: &ActionSettings) -> Result<()>;
}

/// A named, side-effect-free predicate over an event and the shared context.
///
/// Conditions cannot fail. A panicking condition unwinds out of the firing.
pub trait Condition: Send + Sync {
    /// Reported in `RuleResult::failed_conditions` when the predicate is false.
    fn name(&self) -> &str;

    fn evaluate(&self, event: &Event, context: &Context) -> bool;
}

/// A rule-less subscriber for one event type. Runs before any rule.
///
/// An `Err` aborts the whole firing.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn handle(&self, event: &Event, context: &mut Context) -> Result<()>;
}

/// An "around" layer over the whole dispatch.
///
/// Call `next.run(context)` to continue the chain; work placed after that
/// call runs once the inner layers and the rule loop have finished. Not
/// calling it short-circuits the firing. An `Err` aborts the firing.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Used by `Engine::remove_middleware`.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Ascending: lower runs earlier (further out).
    fn order(&self) -> i32 {
        0
    }

    async fn process(&self, context: &mut Context, next: Next<'_>) -> Result<()>;
}

type ActionHandler = dyn Fn(&mut Context, &ActionSettings) -> Result<()> + Send + Sync;

/// Adapter turning a closure into an `Action`.
pub struct ActionFn {
    action_type: String,
    handler: Box<ActionHandler>,
}

impl ActionFn {
    pub fn new<F>(action_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context, &ActionSettings) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            action_type: action_type.into(),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Action for ActionFn {
    fn action_type(&self) -> &str {
        &self.action_type
    }

    async fn execute(&self, context: &mut Context, settings: &ActionSettings) -> Result<()> {
        (self.handler)(context, settings)
    }
}

type ListenerHandler = dyn Fn(&Event, &mut Context) -> Result<()> + Send + Sync;

/// Adapter turning a closure into a `Listener`.
pub struct ListenerFn {
    handler: Box<ListenerHandler>,
}

impl ListenerFn {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event, &mut Context) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Listener for ListenerFn {
    async fn handle(&self, event: &Event, context: &mut Context) -> Result<()> {
        (self.handler)(event, context)
    }
}
