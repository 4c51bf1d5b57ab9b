//! Transport configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Settings for [`ReqwestTransport`](crate::ReqwestTransport)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Whole-exchange timeout; exceeding it completes the call with `Timeout`
    pub timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
    /// Whether 3xx responses are followed
    pub follow_redirects: bool,
}

impl HttpTransportConfig {
    /// Load configuration from environment variables.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `COURIER_HTTP_TIMEOUT_SECS` | `30` |
    /// | `COURIER_HTTP_USER_AGENT` | `courier/<version>` |
    /// | `COURIER_HTTP_FOLLOW_REDIRECTS` | `true` |
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env::var("COURIER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            user_agent: env::var("COURIER_HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
            follow_redirects: env::var("COURIER_HTTP_FOLLOW_REDIRECTS")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.follow_redirects),
        }
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable or disable following redirects
    #[must_use]
    pub const fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            follow_redirects: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
