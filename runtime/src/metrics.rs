//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for request execution:
//! - Execution lifecycle (started, deduplicated, dispatched, completed, cancelled)
//! - Rejected state machine transitions
//! - Response duration
//! - Reducer and effect execution
//!
//! # Example
//!
//! ```rust,no_run
//! use courier_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // The application serves this on its own scrape endpoint
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use courier_core::machine::Phase;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Executions created by the registry
pub const EXECUTIONS_STARTED: &str = "courier.executions.started";
/// `start` calls answered with an existing execution
pub const EXECUTIONS_DEDUPLICATED: &str = "courier.executions.deduplicated";
/// Wire requests handed to the transport
pub const EXECUTIONS_DISPATCHED: &str = "courier.executions.dispatched";
/// Executions that reached `Completed`
pub const EXECUTIONS_COMPLETED: &str = "courier.executions.completed";
/// Executions that reached `Cancelled`
pub const EXECUTIONS_CANCELLED: &str = "courier.executions.cancelled";
/// Actions refused by the transition table
pub const TRANSITIONS_REJECTED: &str = "courier.transitions.rejected";
/// Time from dispatch to transport completion
pub const RESPONSE_DURATION: &str = "courier.response.duration_seconds";
/// Time spent inside the reducer
pub const REDUCER_DURATION: &str = "courier.reducer.duration_seconds";
/// Effects executed, labelled by kind
pub const EFFECTS_EXECUTED: &str = "courier.effects.executed";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the Prometheus recorder and renders the scrape payload.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address of the scrape endpoint the embedding application
    ///   serves [`render`](Self::render) on (e.g., `0.0.0.0:9090`). The server
    ///   itself does not bind it.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs
    /// a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Scrape endpoint address, as configured; used for logging only
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(EXECUTIONS_STARTED, "Executions created by the registry");
    describe_counter!(
        EXECUTIONS_DEDUPLICATED,
        "Start calls answered with an already running execution"
    );
    describe_counter!(EXECUTIONS_DISPATCHED, "Wire requests handed to the transport");
    describe_counter!(EXECUTIONS_COMPLETED, "Executions that captured a response");
    describe_counter!(EXECUTIONS_CANCELLED, "Executions that ended without a response");
    describe_counter!(TRANSITIONS_REJECTED, "Actions refused by the transition table");
    describe_counter!(EFFECTS_EXECUTED, "Effects executed by request managers");
    describe_histogram!(RESPONSE_DURATION, "Time from dispatch to transport completion");
    describe_histogram!(REDUCER_DURATION, "Time spent inside the execution reducer");
}

/// Execution metrics recorder.
pub struct ExecutionMetrics;

impl ExecutionMetrics {
    /// Record a new execution.
    pub fn record_started() {
        counter!(EXECUTIONS_STARTED).increment(1);
    }

    /// Record a `start` answered by a running execution.
    pub fn record_deduplicated() {
        counter!(EXECUTIONS_DEDUPLICATED).increment(1);
    }

    /// Record entering a phase.
    pub fn record_phase(phase: Phase) {
        match phase {
            Phase::Preparing => {},
            Phase::Sending => counter!(EXECUTIONS_DISPATCHED).increment(1),
            Phase::Completed => counter!(EXECUTIONS_COMPLETED).increment(1),
            Phase::Cancelled => counter!(EXECUTIONS_CANCELLED).increment(1),
        }
    }

    /// Record a rejected transition.
    pub fn record_rejected(from: Phase) {
        counter!(TRANSITIONS_REJECTED, "from" => from.as_str()).increment(1);
    }

    /// Record how long the exchange took.
    pub fn record_response(duration: Duration) {
        histogram!(RESPONSE_DURATION).record(duration.as_secs_f64());
    }
}

/// Reducer and effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record one reducer run.
    pub fn record_reduce(duration: Duration) {
        histogram!(REDUCER_DURATION).record(duration.as_secs_f64());
    }

    /// Record an effect execution.
    pub fn record_effect(kind: &'static str) {
        counter!(EFFECTS_EXECUTED, "type" => kind).increment(1);
    }
}
