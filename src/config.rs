//! Configuration for Cortan.
//!
//! Everything has a default, so the library works without any environment.
//! `Config::from_env()` layers `CORTAN_*` variables (and a `.env` file, if
//! present) on top.

use std::time::Duration;

use chrono::TimeDelta;

use crate::error::ConfigError;
use crate::events::Priority;

/// Default bound on how long an emergency publish waits for its handlers.
pub const DEFAULT_EMERGENCY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window for "recently active" users.
pub const DEFAULT_ACTIVE_WINDOW_DAYS: i64 = 7;

/// Main configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub bus: BusConfig,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            bus: BusConfig::from_env()?,
            directory: DirectoryConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

/// Event bus tuning.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// How long `publish_emergency` waits before handing control back.
    pub emergency_timeout: Duration,
    /// Priority used by `publish_proactive` when the caller passes none.
    pub proactive_priority: Priority,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            emergency_timeout: DEFAULT_EMERGENCY_TIMEOUT,
            proactive_priority: Priority::Low,
        }
    }
}

impl BusConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms: u64 = parse_optional_env(
            "CORTAN_EMERGENCY_TIMEOUT_MS",
            DEFAULT_EMERGENCY_TIMEOUT.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CORTAN_EMERGENCY_TIMEOUT_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            emergency_timeout: Duration::from_millis(timeout_ms),
            proactive_priority: parse_optional_env("CORTAN_PROACTIVE_PRIORITY", Priority::Low)?,
        })
    }
}

/// User directory tuning.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Window used by `list_active_default`.
    pub active_window: TimeDelta,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            active_window: TimeDelta::days(DEFAULT_ACTIVE_WINDOW_DAYS),
        }
    }
}

impl DirectoryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let days: i64 =
            parse_optional_env("CORTAN_ACTIVE_WINDOW_DAYS", DEFAULT_ACTIVE_WINDOW_DAYS)?;
        let active_window = TimeDelta::try_days(days)
            .filter(|_| days > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "CORTAN_ACTIVE_WINDOW_DAYS".to_string(),
                message: format!("{days} is not a usable number of days"),
            })?;
        Ok(Self { active_window })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Logging setup consumed by [`crate::observability::init_tracing`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cortan=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            filter: optional_env("CORTAN_LOG")?.unwrap_or(defaults.filter),
            format: parse_optional_env("CORTAN_LOG_FORMAT", defaults.format)?,
        })
    }
}

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!("failed to read {key}: {e}"))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}

// Env vars are process-global, so serialize tests that mutate them.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
