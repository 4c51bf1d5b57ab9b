//! Engine configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Configuration for request managers and the registry
///
/// # Example
///
/// ```
/// use courier_runtime::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_event_capacity(128)
///     .with_terminal_timeout(Duration::from_secs(5));
/// assert_eq!(config.event_capacity, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheme prepended to URLs written without one
    pub default_scheme: String,
    /// Events buffered per execution for slow subscribers
    pub event_capacity: usize,
    /// How long [`RequestManager::wait`](crate::RequestManager::wait) waits for a terminal state
    pub terminal_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `COURIER_DEFAULT_SCHEME` | `http` |
    /// | `COURIER_EVENT_CAPACITY` | `32` |
    /// | `COURIER_TERMINAL_TIMEOUT_SECS` | `30` |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_scheme: env::var("COURIER_DEFAULT_SCHEME")
                .ok()
                .filter(|scheme| !scheme.trim().is_empty())
                .unwrap_or(defaults.default_scheme),
            event_capacity: env::var("COURIER_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.event_capacity),
            terminal_timeout: env::var("COURIER_TERMINAL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.terminal_timeout, Duration::from_secs),
        }
    }

    /// Set the default scheme
    #[must_use]
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Set the per-execution event buffer (at least 1)
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Set the default wait for a terminal state
    #[must_use]
    pub const fn with_terminal_timeout(mut self, timeout: Duration) -> Self {
        self.terminal_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_scheme: "http".to_string(),
            event_capacity: 32,
            terminal_timeout: Duration::from_secs(30),
        }
    }
}
