//! Error taxonomy for request execution.
//!
//! None of these errors ever escapes an execution as a panic. Builder errors
//! end the execution in `Cancelled`, transport errors become a failed
//! [`ResponseRecord`](crate::response::ResponseRecord), persistence and
//! resolution errors are logged or surfaced as events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to turn a [`RequestSpec`](crate::request::RequestSpec) into a wire request
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuilderError {
    /// The URL is not a valid absolute URL, even after adding a default scheme
    #[error("Invalid URL: '{url}'")]
    InvalidUrl {
        /// The URL as it was given to the builder
        url: String,
    },

    /// No project is known for the request's workspace
    #[error("No project found for workspace '{workspace_id}'")]
    MissingProject {
        /// The workspace that could not be found
        workspace_id: String,
    },

    /// The body requires data that is not there (e.g. binary body without attachment)
    #[error("Request body has no content to send")]
    NoBody,

    /// The method is not among the project's declared methods
    #[error("Method '{method}' is not valid in this project")]
    UnsupportedMethod {
        /// The rejected method name
        method: String,
    },
}

/// Failure reported by the transport instead of a response
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    /// Connection, DNS, TLS, or protocol failure
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting for a response
    #[error("Request timed out")]
    Timeout,

    /// The call was cancelled before completing
    #[error("Request was cancelled")]
    Cancelled,
}

impl TransportError {
    /// Status code recorded for this error (always negative)
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::Network(_) => -1,
            Self::Timeout => -2,
            Self::Cancelled => -3,
        }
    }
}

/// Failure of the history collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The history backend rejected or failed the write
    #[error("Failed to persist history entry: {0}")]
    WriteFailed(String),

    /// The history backend is not reachable
    #[error("History store unavailable: {0}")]
    Unavailable(String),
}

/// Failure to substitute environment variables ("extrapolation failed")
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A token referenced a variable the environment does not define
    #[error("Unknown variable '{name}'")]
    UnknownVariable {
        /// The variable name inside the token
        name: String,
    },

    /// The selected environment does not exist
    #[error("Environment '{0}' not found")]
    EnvironmentNotFound(String),

    /// Any other resolver failure
    #[error("Variable substitution failed: {0}")]
    Other(String),
}
