//! Error types for the HTTP transport

use thiserror::Error;

/// Errors that can occur when setting up the transport
///
/// Failures of individual calls are reported through the completion
/// listener as [`TransportError`](courier_core::error::TransportError).
#[derive(Debug, Error)]
pub enum HttpError {
    /// The HTTP client could not be built from the configuration
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}
