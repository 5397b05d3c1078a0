//! Cortan: the event spine of a personal AI assistant.
//!
//! Components publish typed [`Event`]s onto an [`EventBus`]; handlers are
//! routed by event type, by priority, and (for critical events) by urgency.
//! Every event carries an [`EventContext`] describing who it concerns, and
//! contexts may point at a [`UserProfile`] held by the [`UserDirectory`]. The
//! [`select_response_style`] function turns priority plus context into a
//! [`ResponseStyle`] for downstream output.

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod observability;
pub mod profile;

pub use bootstrap::Cortan;
pub use config::{BusConfig, Config, DirectoryConfig, LoggingConfig};
pub use directory::UserDirectory;
pub use error::{ConfigError, Error, HandlerError};
pub use events::{
    EmergencyOutcome, Event, EventBus, EventContext, EventFactory, EventHandler, EventPayload,
    Priority, ResponseStyle, select_response_style,
};
pub use profile::{RelationshipStatus, SharedProfile, UserProfile, UserPreferences};
