//! Startup wiring: configuration, bus, and directory in one place.
//!
//! Hosts that want the defaults build a [`Cortan`] with [`Cortan::from_env`];
//! tests and embedders that already hold a [`Config`] use [`Cortan::new`].

use crate::config::Config;
use crate::directory::UserDirectory;
use crate::error::Result;
use crate::events::EventBus;

/// A configured bus and user directory, ready for handlers.
pub struct Cortan {
    pub config: Config,
    pub bus: EventBus,
    pub directory: UserDirectory,
}

impl Cortan {
    pub fn new(config: Config) -> Self {
        let bus = EventBus::with_config(config.bus.clone());
        let directory = UserDirectory::with_config(config.directory.clone());
        tracing::debug!(
            emergency_timeout_ms = config.bus.emergency_timeout.as_millis() as u64,
            active_window_days = config.directory.active_window.num_days(),
            "Cortan initialized"
        );
        Self {
            config,
            bus,
            directory,
        }
    }

    /// Load [`Config`] from the environment (and `.env`) and build on it.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Config::from_env()?))
    }
}
