//! Priority-routed event bus.
//!
//! Handlers register under four independent dimensions: exact event type,
//! exact event type with the context passed explicitly, exact priority, and
//! "urgent" (critical events only). Publishing snapshots every matching
//! handler under the registry lock, releases the lock, and spawns each handler
//! on its own task. Handlers may therefore subscribe or publish from inside
//! their own body without deadlocking.
//!
//! A handler's failure (an `Err` or a panic) is logged where it happens and
//! counted; it never reaches sibling handlers or the publisher.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, warn};

use crate::config::BusConfig;
use crate::error::HandlerError;
use crate::events::context::{EventContext, SUGGESTION_METADATA_KEY};
use crate::events::event::{
    EMERGENCY_EVENT_TYPE, Event, EventFactory, Priority, SUGGESTION_EVENT_TYPE,
    SequenceGenerator,
};
use crate::events::handler::{ContextHandler, EventHandler, FnContextHandler, FnHandler};

/// Which registry a subscription lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerCategory {
    Type,
    Contextual,
    Priority,
    Urgent,
}

impl fmt::Display for HandlerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerCategory::Type => "type",
            HandlerCategory::Contextual => "contextual",
            HandlerCategory::Priority => "priority",
            HandlerCategory::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Subscription identifier for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    id: u64,
    category: HandlerCategory,
}

impl SubscriptionId {
    pub fn category(&self) -> HandlerCategory {
        self.category
    }
}

/// Statistics for the event bus.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    pub events_published: u64,
    pub handlers_dispatched: u64,
    pub handler_failures: u64,
    pub events_by_type: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    failures: AtomicU64,
}

struct Entry<H: ?Sized> {
    id: u64,
    handler: Arc<H>,
}

/// A handler selected for one dispatch.
enum Target {
    Plain {
        category: HandlerCategory,
        handler: Arc<dyn EventHandler>,
    },
    Contextual(Arc<dyn ContextHandler>),
}

impl Target {
    fn category(&self) -> HandlerCategory {
        match self {
            Target::Plain { category, .. } => *category,
            Target::Contextual(_) => HandlerCategory::Contextual,
        }
    }

    fn name(&self) -> String {
        match self {
            Target::Plain { handler, .. } => handler.name().to_string(),
            Target::Contextual(handler) => handler.name().to_string(),
        }
    }

    async fn invoke(self, event: Arc<Event>) -> Result<(), HandlerError> {
        match self {
            Target::Plain { handler, .. } => handler.handle(event).await,
            Target::Contextual(handler) => {
                let context = Arc::clone(event.context());
                handler.handle(event, context).await
            }
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_type: HashMap<String, Vec<Entry<dyn EventHandler>>>,
    by_type_with_context: HashMap<String, Vec<Entry<dyn ContextHandler>>>,
    by_priority: HashMap<Priority, Vec<Entry<dyn EventHandler>>>,
    urgent: Vec<Entry<dyn EventHandler>>,
    user_contexts: HashMap<String, EventContext>,
    global_context: EventContext,
    events_by_type: HashMap<String, u64>,
}

impl Registry {
    fn allocate(&mut self, category: HandlerCategory) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        SubscriptionId { id, category }
    }

    fn snapshot(&self, event_type: &str, priority: Priority) -> Vec<Target> {
        let mut targets = Vec::new();

        if let Some(entries) = self.by_type.get(event_type) {
            targets.extend(entries.iter().map(|e| Target::Plain {
                category: HandlerCategory::Type,
                handler: Arc::clone(&e.handler),
            }));
        }
        if let Some(entries) = self.by_type_with_context.get(event_type) {
            targets.extend(
                entries
                    .iter()
                    .map(|e| Target::Contextual(Arc::clone(&e.handler))),
            );
        }
        if let Some(entries) = self.by_priority.get(&priority) {
            targets.extend(entries.iter().map(|e| Target::Plain {
                category: HandlerCategory::Priority,
                handler: Arc::clone(&e.handler),
            }));
        }
        if priority == Priority::Critical {
            targets.extend(self.urgent.iter().map(|e| Target::Plain {
                category: HandlerCategory::Urgent,
                handler: Arc::clone(&e.handler),
            }));
        }

        targets
    }

    fn remove(&mut self, subscription: SubscriptionId) -> bool {
        fn remove_from<H: ?Sized>(entries: &mut Vec<Entry<H>>, id: u64) -> bool {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        }

        let id = subscription.id;
        match subscription.category {
            HandlerCategory::Type => {
                let removed = self.by_type.values_mut().any(|v| remove_from(v, id));
                self.by_type.retain(|_, v| !v.is_empty());
                removed
            }
            HandlerCategory::Contextual => {
                let removed = self
                    .by_type_with_context
                    .values_mut()
                    .any(|v| remove_from(v, id));
                self.by_type_with_context.retain(|_, v| !v.is_empty());
                removed
            }
            HandlerCategory::Priority => {
                let removed = self.by_priority.values_mut().any(|v| remove_from(v, id));
                self.by_priority.retain(|_, v| !v.is_empty());
                removed
            }
            HandlerCategory::Urgent => remove_from(&mut self.urgent, id),
        }
    }
}

/// Outcome of one dispatch once every handler has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Completion handle for a publish call.
///
/// Handlers are already running when this is returned. Awaiting
/// [`DispatchHandle::wait`] resolves once all of them have finished; dropping
/// the handle detaches them and they still run to completion.
#[derive(Debug)]
pub struct DispatchHandle {
    tasks: Vec<JoinHandle<bool>>,
}

impl DispatchHandle {
    /// A handle for a publish that matched no handlers.
    pub fn completed() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn dispatched(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait for every dispatched handler to finish.
    pub async fn wait(self) -> DispatchReport {
        let dispatched = self.tasks.len();
        if dispatched == 0 {
            return DispatchReport::default();
        }

        let succeeded = futures::future::join_all(self.tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        DispatchReport {
            dispatched,
            succeeded,
            failed: dispatched - succeeded,
        }
    }
}

/// Result of [`EventBus::publish_emergency`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyOutcome {
    /// Every handler finished inside the bound.
    Completed {
        correlation_id: String,
        report: DispatchReport,
    },
    /// The bound elapsed first; handlers keep running.
    TimedOut {
        correlation_id: String,
        waited: Duration,
    },
}

impl EmergencyOutcome {
    pub fn correlation_id(&self) -> &str {
        match self {
            EmergencyOutcome::Completed { correlation_id, .. }
            | EmergencyOutcome::TimedOut { correlation_id, .. } => correlation_id,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, EmergencyOutcome::TimedOut { .. })
    }
}

/// Process-local publish/subscribe bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    counters: Arc<Counters>,
    factory: EventFactory,
    config: BusConfig,
}

impl EventBus {
    /// Create a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self::with_sequence(config, Arc::new(SequenceGenerator::new()))
    }

    /// Create a bus that stamps correlation ids from an injected sequence.
    pub fn with_sequence(config: BusConfig, sequence: Arc<SequenceGenerator>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            counters: Arc::new(Counters::default()),
            factory: EventFactory::new(sequence),
            config,
        }
    }

    /// Factory sharing this bus's correlation-id sequence.
    pub fn factory(&self) -> &EventFactory {
        &self.factory
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // -- registration -------------------------------------------------------

    /// Run `handler` for every event of exactly `event_type`.
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let mut registry = self.registry.lock().await;
        let subscription = registry.allocate(HandlerCategory::Type);
        debug!(event_type = %event_type, handler = handler.name(), "subscribed");
        registry
            .by_type
            .entry(event_type)
            .or_default()
            .push(Entry {
                id: subscription.id,
                handler,
            });
        subscription
    }

    /// Run `handler` with the event and its context for every event of
    /// exactly `event_type`.
    pub async fn subscribe_with_context(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn ContextHandler>,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let mut registry = self.registry.lock().await;
        let subscription = registry.allocate(HandlerCategory::Contextual);
        debug!(
            event_type = %event_type,
            handler = handler.name(),
            "subscribed with context"
        );
        registry
            .by_type_with_context
            .entry(event_type)
            .or_default()
            .push(Entry {
                id: subscription.id,
                handler,
            });
        subscription
    }

    /// Run `handler` for every event at exactly `priority`, whatever its type.
    pub async fn subscribe_priority(
        &self,
        priority: Priority,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let mut registry = self.registry.lock().await;
        let subscription = registry.allocate(HandlerCategory::Priority);
        debug!(%priority, handler = handler.name(), "subscribed to priority");
        registry
            .by_priority
            .entry(priority)
            .or_default()
            .push(Entry {
                id: subscription.id,
                handler,
            });
        subscription
    }

    /// Run `handler` for critical events only, on top of normal routing.
    pub async fn subscribe_urgent(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let mut registry = self.registry.lock().await;
        let subscription = registry.allocate(HandlerCategory::Urgent);
        debug!(handler = handler.name(), "subscribed to urgent events");
        registry.urgent.push(Entry {
            id: subscription.id,
            handler,
        });
        subscription
    }

    /// Subscribe an async closure by event type.
    pub async fn subscribe_fn<F, Fut>(
        &self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe(event_type, Arc::new(FnHandler::new(name, f)))
            .await
    }

    /// Subscribe an async closure that also receives the context.
    pub async fn subscribe_with_context_fn<F, Fut>(
        &self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(Arc<Event>, Arc<EventContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe_with_context(event_type, Arc::new(FnContextHandler::new(name, f)))
            .await
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.registry.lock().await.remove(subscription)
    }

    /// Type and context-filtered handlers registered for `event_type`.
    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        let registry = self.registry.lock().await;
        registry.by_type.get(event_type).map_or(0, Vec::len)
            + registry
                .by_type_with_context
                .get(event_type)
                .map_or(0, Vec::len)
    }

    // -- publication --------------------------------------------------------

    /// Dispatch `event` to every handler matching `event_type` or its priority.
    pub async fn publish(&self, event_type: &str, event: impl Into<Arc<Event>>) -> DispatchHandle {
        let event: Arc<Event> = event.into();

        let targets = {
            let mut registry = self.registry.lock().await;
            *registry
                .events_by_type
                .entry(event_type.to_string())
                .or_insert(0) += 1;
            registry.snapshot(event_type, event.priority())
        };
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        if targets.is_empty() {
            debug!(
                event_type,
                correlation_id = event.correlation_id(),
                "No handlers registered for event"
            );
            return DispatchHandle::completed();
        }

        debug!(
            event_type,
            correlation_id = event.correlation_id(),
            priority = %event.priority(),
            handlers = targets.len(),
            "Dispatching event"
        );
        self.counters
            .dispatched
            .fetch_add(targets.len() as u64, Ordering::Relaxed);

        let event_type: Arc<str> = Arc::from(event_type);
        let span = Span::current();
        let tasks = targets
            .into_iter()
            .map(|target| {
                spawn_handler(
                    target,
                    Arc::clone(&event_type),
                    Arc::clone(&event),
                    Arc::clone(&self.counters),
                    span.clone(),
                )
            })
            .collect();

        DispatchHandle { tasks }
    }

    /// Publish under the event's own type tag.
    pub async fn emit(&self, event: Event) -> DispatchHandle {
        let event_type = event.event_type().to_string();
        self.publish(&event_type, event).await
    }

    /// Publish a system-initiated suggestion as a `cortana.suggestion` event.
    ///
    /// The context is flagged as proactive and carries the suggestion text
    /// under [`SUGGESTION_METADATA_KEY`]. `None` uses the configured
    /// proactive priority (low by default).
    pub async fn publish_proactive(
        &self,
        suggestion: &str,
        mut context: EventContext,
        priority: Option<Priority>,
    ) -> DispatchHandle {
        context.is_proactive_suggestion = true;
        context
            .metadata
            .insert(SUGGESTION_METADATA_KEY.to_string(), suggestion.to_string());
        let priority = priority.unwrap_or(self.config.proactive_priority);

        let event = self.factory.suggestion(suggestion, context, priority);
        self.publish(SUGGESTION_EVENT_TYPE, event).await
    }

    /// Publish a critical `cortana.emergency` event and wait for its handlers,
    /// up to the configured bound.
    ///
    /// Unlike every other publish path, this one always waits. When the bound
    /// elapses the caller gets [`EmergencyOutcome::TimedOut`]; handlers are not
    /// cancelled.
    pub async fn publish_emergency(
        &self,
        message: &str,
        mission_context: &str,
    ) -> EmergencyOutcome {
        let context = EventContext::default()
            .with_emotional_state("urgent")
            .with_urgency(1.0)
            .with_mission(mission_context);
        let event = self.factory.emergency(message, context);
        let correlation_id = event.correlation_id().to_string();

        warn!(
            correlation_id = %correlation_id,
            mission = mission_context,
            "Publishing emergency: {}",
            message
        );

        let bound = self.config.emergency_timeout;
        let handle = self.publish(EMERGENCY_EVENT_TYPE, event).await;
        match tokio::time::timeout(bound, handle.wait()).await {
            Ok(report) => EmergencyOutcome::Completed {
                correlation_id,
                report,
            },
            Err(_) => {
                warn!(
                    correlation_id = %correlation_id,
                    timeout_ms = bound.as_millis() as u64,
                    "Emergency handlers still running after bound; returning to caller"
                );
                EmergencyOutcome::TimedOut {
                    correlation_id,
                    waited: bound,
                }
            }
        }
    }

    // -- context store ------------------------------------------------------

    pub async fn set_user_context(&self, user_id: impl Into<String>, context: EventContext) {
        self.registry
            .lock()
            .await
            .user_contexts
            .insert(user_id.into(), context);
    }

    pub async fn user_context(&self, user_id: &str) -> Option<EventContext> {
        self.registry.lock().await.user_contexts.get(user_id).cloned()
    }

    pub async fn remove_user_context(&self, user_id: &str) -> Option<EventContext> {
        self.registry.lock().await.user_contexts.remove(user_id)
    }

    pub async fn set_global_context(&self, context: EventContext) {
        self.registry.lock().await.global_context = context;
    }

    pub async fn global_context(&self) -> EventContext {
        self.registry.lock().await.global_context.clone()
    }

    // -- statistics ---------------------------------------------------------

    pub async fn stats(&self) -> EventBusStats {
        let events_by_type = self.registry.lock().await.events_by_type.clone();
        EventBusStats {
            events_published: self.counters.published.load(Ordering::Relaxed),
            handlers_dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.failures.load(Ordering::Relaxed),
            events_by_type,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one handler off the async workers and report whether it succeeded.
///
/// The handler body is driven by `Handle::block_on` on a blocking-pool thread,
/// so a handler that blocks its thread never stalls the publisher, its timers,
/// or sibling handlers. A panic surfaces as a `JoinError` here and is logged
/// even when nobody waits on the dispatch. Everything runs inside the
/// publisher's span.
fn spawn_handler(
    target: Target,
    event_type: Arc<str>,
    event: Arc<Event>,
    counters: Arc<Counters>,
    span: Span,
) -> JoinHandle<bool> {
    let task = async move {
        let name = target.name();
        let category = target.category();
        let correlation_id = event.correlation_id().to_string();

        let runtime = Handle::current();
        let body = target.invoke(event).in_current_span();
        let outcome = tokio::task::spawn_blocking(move || runtime.block_on(body)).await;
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    handler = %name,
                    %category,
                    event_type = %event_type,
                    correlation_id = %correlation_id,
                    "Handler failed: {}",
                    e
                );
                false
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    handler = %name,
                    %category,
                    event_type = %event_type,
                    correlation_id = %correlation_id,
                    "Handler panicked: {:?}",
                    e
                );
                false
            }
        }
    };
    tokio::spawn(task.instrument(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::RequestKind;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn counting_handler(name: &str, hits: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler::new(name, move |_event: Arc<Event>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    }

    fn request(bus: &EventBus) -> Event {
        bus.factory()
            .user_request("hello", RequestKind::Statement, EventContext::default())
    }

    #[tokio::test]
    async fn test_publish_without_handlers_completes_immediately() {
        let bus = EventBus::new();
        let handle = bus.publish("user.request", request(&bus)).await;
        assert_eq!(handle.dispatched(), 0);
        assert!(handle.is_finished());
        assert_eq!(handle.wait().await, DispatchReport::default());

        let stats = bus.stats().await;
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.handlers_dispatched, 0);
        assert_eq!(stats.events_by_type.get("user.request"), Some(&1));
    }

    #[tokio::test]
    async fn test_type_handler_receives_only_its_type() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("user.request", counting_handler("t", hits.clone()))
            .await;

        bus.publish("user.request", request(&bus)).await.wait().await;
        bus.publish("other.type", request(&bus)).await.wait().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_type_and_context_registrations_both_fire() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("user.request", counting_handler("plain", hits.clone()))
            .await;
        let ctx_hits = Arc::clone(&hits);
        bus.subscribe_with_context_fn(
            "user.request",
            "contextual",
            move |_event: Arc<Event>, _ctx: Arc<EventContext>| {
                let hits = Arc::clone(&ctx_hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(bus.subscriber_count("user.request").await, 2);
        let report = bus.publish("user.request", request(&bus)).await.wait().await;
        assert_eq!(report.dispatched, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_registration() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = bus
            .subscribe_priority(Priority::Normal, counting_handler("p", hits.clone()))
            .await;
        assert_eq!(id.category(), HandlerCategory::Priority);

        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);

        bus.publish("user.request", request(&bus)).await.wait().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_handler_is_logged_and_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe_fn("user.request", "broken", |_event: Arc<Event>| async {
            Err(HandlerError::failed("backend offline"))
        })
        .await;
        bus.subscribe("user.request", counting_handler("healthy", hits.clone()))
            .await;

        let report = bus.publish("user.request", request(&bus)).await.wait().await;
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().await.handler_failures, 1);
        assert!(logs_contain("backend offline"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe_fn("user.request", "panicky", |event: Arc<Event>| async move {
            if !event.correlation_id().is_empty() {
                panic!("handler exploded");
            }
            Ok(())
        })
        .await;
        bus.subscribe("user.request", counting_handler("healthy", hits.clone()))
            .await;

        let report = bus.publish("user.request", request(&bus)).await.wait().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_can_reenter_bus() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("follow.up", counting_handler("follower", hits.clone()))
            .await;

        let inner_bus = bus.clone();
        bus.subscribe_fn("user.request", "reentrant", move |_event: Arc<Event>| {
            let bus = inner_bus.clone();
            async move {
                bus.subscribe_fn("late", "late", |_e: Arc<Event>| async { Ok(()) })
                    .await;
                let follow = bus.factory().user_request(
                    "follow",
                    RequestKind::Statement,
                    EventContext::default(),
                );
                bus.publish("follow.up", follow).await.wait().await;
                Ok(())
            }
        })
        .await;

        let report = bus.publish("user.request", request(&bus)).await.wait().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("late").await, 1);
    }

    #[tokio::test]
    async fn test_context_store_is_independent() {
        let bus = EventBus::new();
        assert!(bus.user_context("alice").await.is_none());
        assert_eq!(bus.global_context().await.session_id, "default");

        bus.set_user_context("alice", EventContext::default().with_location("home"))
            .await;
        bus.set_global_context(EventContext::default().with_session("s-1"))
            .await;

        let alice = bus.user_context("alice").await.map(|c| c.location);
        assert_eq!(alice.as_deref(), Some("home"));
        assert_eq!(bus.global_context().await.session_id, "s-1");
        assert!(bus.remove_user_context("alice").await.is_some());
        assert!(bus.user_context("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_emergency_completes_within_bound() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe_urgent(counting_handler("pager", hits.clone()))
            .await;

        let outcome = bus.publish_emergency("core breach", "mission-7").await;
        assert!(!outcome.timed_out());
        assert!(matches!(
            outcome,
            EmergencyOutcome::Completed {
                report: DispatchReport { dispatched: 1, succeeded: 1, failed: 0 },
                ..
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
