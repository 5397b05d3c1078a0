//! Handler traits and closure adapters.
//!
//! A handler is a unit of work: it receives an event (and, for
//! context-filtered handlers, the event's context) and completes
//! asynchronously. Errors are reported back to the bus, which logs them and
//! keeps going.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::context::EventContext;
use crate::events::event::Event;

/// Handler invoked with the event alone.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError>;
}

/// Handler invoked with the event and its context passed explicitly.
#[async_trait]
pub trait ContextHandler: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(
        &self,
        event: Arc<Event>,
        context: Arc<EventContext>,
    ) -> Result<(), HandlerError>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new<Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), HandlerError>> + Send,
    {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}

/// Adapts an async closure into a [`ContextHandler`].
pub struct FnContextHandler<F> {
    name: String,
    f: F,
}

impl<F> FnContextHandler<F> {
    pub fn new<Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Event>, Arc<EventContext>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), HandlerError>> + Send,
    {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> ContextHandler for FnContextHandler<F>
where
    F: Fn(Arc<Event>, Arc<EventContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        event: Arc<Event>,
        context: Arc<EventContext>,
    ) -> Result<(), HandlerError> {
        (self.f)(event, context).await
    }
}

/// Logs every event it sees at `info`. Used by the CLI demo.
pub struct LoggingHandler {
    name: String,
}

impl LoggingHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        tracing::info!(
            handler = %self.name,
            event_type = event.event_type(),
            correlation_id = event.correlation_id(),
            priority = %event.priority(),
            user_id = %event.context().user_id(),
            "event received"
        );
        Ok(())
    }
}
