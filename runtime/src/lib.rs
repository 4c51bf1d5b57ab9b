//! # Courier Runtime
//!
//! Runtime for the Courier request execution engine.
//!
//! This crate executes the effects the execution reducer describes and
//! keeps track of which requests are running.
//!
//! ## Core Components
//!
//! - **`RequestManager`**: Owns one execution, serializes its actions, and runs its effects
//! - **`ExecutionRegistry`**: At most one live execution per request id
//! - **Metrics**: Prometheus counters and histograms for the lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use courier_runtime::{EngineConfig, ExecutionRegistry};
//!
//! let registry = ExecutionRegistry::with_config(environment, EngineConfig::from_env());
//!
//! // Start (or join) an execution
//! let started = registry.start(spec).await;
//!
//! // Wait for the outcome
//! let phase = started.manager.wait().await?;
//! let record = started.manager.response().await;
//! ```

/// Engine configuration
pub mod config;

/// Per-execution runtime
pub mod manager;

/// Prometheus metrics for observability
pub mod metrics;

/// Live executions keyed by request id
pub mod registry;

/// Error types for the runtime
pub mod error {
    use courier_core::request::RequestId;
    use std::time::Duration;
    use thiserror::Error;

    /// Errors from the registry and request managers
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RegistryError {
        /// Storage has no request with this id
        #[error("Unknown request: {0}")]
        UnknownRequest(RequestId),

        /// The execution did not reach a terminal state in time
        ///
        /// The execution keeps running; only the wait gave up.
        #[error("Timed out after {timeout:?} waiting for request {request_id} to finish")]
        Timeout {
            /// Request being waited on
            request_id: RequestId,
            /// How long the caller waited
            timeout: Duration,
        },
    }
}

pub use config::EngineConfig;
pub use error::RegistryError;
pub use manager::RequestManager;
pub use registry::{ExecutionRegistry, Started};
