//! The middleware onion and built-in layers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::info;
use tripwire_events::Event;

use crate::context::Context;
use crate::engine::{Engine, RuleOutcomes};
use crate::traits::Middleware;

/// Continuation handed to `Middleware::process`: the rest of the chain,
/// ending in the listener + rule loop.
pub struct Next<'a> {
    engine: &'a Engine,
    chain: &'a [Arc<dyn Middleware>],
    event: &'a Arc<Event>,
    outcomes: &'a mut RuleOutcomes,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        chain: &'a [Arc<dyn Middleware>],
        event: &'a Arc<Event>,
        outcomes: &'a mut RuleOutcomes,
    ) -> Self {
        Self {
            engine,
            chain,
            event,
            outcomes,
        }
    }

    /// The event being dispatched.
    pub fn event(&self) -> &Event {
        self.event
    }

    /// Run the remaining layers, then the listeners and rules.
    pub fn run<'c>(self, context: &'c mut Context) -> BoxFuture<'c, Result<()>>
    where
        'a: 'c,
    {
        let Next {
            engine,
            chain,
            event,
            outcomes,
        } = self;

        Box::pin(async move {
            match chain.split_first() {
                Some((layer, rest)) => {
                    let next = Next::new(engine, rest, event, outcomes);
                    layer.process(context, next).await
                }
                None => engine.dispatch_inner(event, context, outcomes).await,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

type MiddlewareHandler =
    dyn for<'c> Fn(&'c mut Context, Next<'c>) -> BoxFuture<'c, Result<()>> + Send + Sync;

/// Adapter turning a closure into a `Middleware`.
///
/// ```ignore
/// engine.use_fn("audit", 0, |ctx, next| {
///     Box::pin(async move {
///         ctx.set("audited", true);
///         next.run(ctx).await
///     })
/// });
/// ```
pub struct InlineMiddleware {
    name: String,
    order: i32,
    handler: Box<MiddlewareHandler>,
}

impl InlineMiddleware {
    pub fn new<F>(name: impl Into<String>, order: i32, handler: F) -> Self
    where
        F: for<'c> Fn(&'c mut Context, Next<'c>) -> BoxFuture<'c, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            order,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Middleware for InlineMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn process(&self, context: &mut Context, next: Next<'_>) -> Result<()> {
        (self.handler)(context, next).await
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Logs how long the wrapped chain took. Optionally writes the elapsed
/// milliseconds into a context key.
pub struct TimingMiddleware {
    order: i32,
    context_key: Option<String>,
}

impl TimingMiddleware {
    pub fn new(order: i32) -> Self {
        Self {
            order,
            context_key: None,
        }
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn process(&self, context: &mut Context, next: Next<'_>) -> Result<()> {
        let event_type = next.event().event_type.clone();
        let started = Instant::now();

        let outcome = next.run(context).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(event_type = %event_type, elapsed_ms, ok = outcome.is_ok(), "Dispatch timed");
        if let Some(key) = &self.context_key {
            context.set(key.clone(), elapsed_ms);
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

type GuardPredicate = dyn Fn(&Event, &Context) -> bool + Send + Sync;

/// Short-circuits the firing when the predicate returns false: stops the
/// pipeline and never calls the inner layers.
pub struct GuardMiddleware {
    name: String,
    order: i32,
    allow: Box<GuardPredicate>,
}

impl GuardMiddleware {
    pub fn new<F>(name: impl Into<String>, order: i32, allow: F) -> Self
    where
        F: Fn(&Event, &Context) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order,
            allow: Box::new(allow),
        }
    }
}

#[async_trait]
impl Middleware for GuardMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn process(&self, context: &mut Context, next: Next<'_>) -> Result<()> {
        if (self.allow)(next.event(), context) {
            return next.run(context).await;
        }
        info!(guard = %self.name, event_type = %next.event().event_type, "Guard declined firing");
        context.stop_pipeline();
        Ok(())
    }
}
