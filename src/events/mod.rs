//! Context-aware, priority-routed event bus.
//!
//! - **Event**: immutable record of one occurrence: type tag, [`Priority`],
//!   correlation id, timestamp, [`EventContext`], and a closed [`EventPayload`].
//! - **EventContext**: who, where, mood, urgency; optionally points at a
//!   shared user profile.
//! - **EventBus**: four handler registries (type, type-with-context,
//!   priority, urgent), concurrent fan-out with failure isolation, plus the
//!   proactive and emergency publish paths and a per-user/global context store.
//! - **ResponseStyle**: pure decision over priority and context.
//!
//! Priorities order `Critical < High < Normal < Low < Background`; urgent
//! handlers only ever see `Critical` events.

pub mod bus;
pub mod context;
pub mod event;
pub mod handler;
pub mod style;

pub use bus::{
    DispatchHandle, DispatchReport, EmergencyOutcome, EventBus, EventBusStats, HandlerCategory,
    SubscriptionId,
};
pub use context::{EventContext, SUGGESTION_METADATA_KEY};
pub use event::{
    EMERGENCY_EVENT_TYPE, EnvironmentKind, Event, EventFactory, EventPayload, LearningKind,
    Priority, ProcessingStage, RequestKind, SUGGESTION_EVENT_TYPE, SequenceGenerator,
    WelcomeKind,
};
pub use handler::{ContextHandler, EventHandler, FnContextHandler, FnHandler, LoggingHandler};
pub use style::{ResponseStyle, select_response_style};
