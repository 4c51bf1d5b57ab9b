//! Collaborator traits and the execution environment.
//!
//! All external dependencies of an execution are abstracted behind traits and
//! injected through [`ExecutionEnvironment`]. Production code wires in real
//! implementations; tests use the doubles from `courier-testing`.

use crate::builder::RequestBuilder;
use crate::error::{PersistenceError, ResolveError};
use crate::request::{HistoryId, Project, RequestId, RequestSpec, WorkspaceId};
use crate::response::{ResponseRecord, TransportResult};
use crate::wire::WireRequest;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Test - fixed time for deterministic tests
/// struct FixedClock { time: DateTime<Utc> }
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle to an in-flight transport call
pub trait Cancellable: Send {
    /// Best-effort cancellation; must be safe to call after completion
    fn cancel(&self);
}

impl Cancellable for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}

/// Receives exactly one transport outcome
///
/// `complete` consumes the listener, so a transport cannot report twice.
/// Dropping it without completing is reported to the execution as
/// [`TransportError::Cancelled`](crate::error::TransportError::Cancelled).
#[derive(Debug)]
pub struct CompletionListener {
    sender: oneshot::Sender<TransportResult>,
}

impl CompletionListener {
    /// Wrap the sending half of a oneshot channel
    #[must_use]
    pub const fn new(sender: oneshot::Sender<TransportResult>) -> Self {
        Self { sender }
    }

    /// A listener and the receiver it reports to
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<TransportResult>) {
        let (sender, receiver) = oneshot::channel();
        (Self::new(sender), receiver)
    }

    /// Deliver the transport outcome
    pub fn complete(self, result: TransportResult) {
        if self.sender.send(result).is_err() {
            tracing::trace!("Transport completed after the execution stopped listening");
        }
    }

    /// Whether the execution has stopped listening
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Sends wire requests
///
/// `send` must return promptly; the actual exchange happens in the
/// transport's own task and reports through the listener.
pub trait Transport: Send + Sync {
    /// Start sending `request`, reporting the outcome to `listener`
    fn send(&self, request: WireRequest, listener: CompletionListener) -> Box<dyn Cancellable>;
}

/// One completed exchange, as handed to history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Request that was executed
    pub request_id: RequestId,
    /// Owning workspace
    pub workspace_id: WorkspaceId,
    /// What was sent
    pub request: WireRequest,
    /// What came back
    pub response: ResponseRecord,
    /// When the request was handed to the transport
    pub dispatched_at: DateTime<Utc>,
    /// When the transport reported back
    pub completed_at: DateTime<Utc>,
}

/// Persists completed exchanges
pub trait HistoryStore: Send + Sync {
    /// Persist an entry
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the entry could not be stored. The
    /// execution still delivers its response.
    fn record(&self, entry: HistoryEntry) -> BoxFuture<'static, Result<HistoryId, PersistenceError>>;
}

/// Substitutes environment variable tokens in a spec
pub trait EnvironmentResolver: Send + Sync {
    /// Produce a resolved copy of `spec`
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when substitution fails. The execution
    /// continues with the unresolved spec.
    fn resolve(&self, spec: &RequestSpec) -> Result<RequestSpec, ResolveError>;
}

/// Resolver that returns the spec unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughResolver;

impl EnvironmentResolver for PassthroughResolver {
    fn resolve(&self, spec: &RequestSpec) -> Result<RequestSpec, ResolveError> {
        Ok(spec.clone())
    }
}

/// Stored requests and project metadata
pub trait RequestStore: Send + Sync {
    /// Load a stored request
    fn request(&self, id: &RequestId) -> Option<RequestSpec>;

    /// Load the project of a workspace
    fn project(&self, workspace_id: &WorkspaceId) -> Option<Project>;
}

/// Everything an execution needs from the outside world
#[derive(Clone)]
pub struct ExecutionEnvironment {
    /// Sends wire requests
    pub transport: Arc<dyn Transport>,
    /// Persists completed exchanges
    pub history: Arc<dyn HistoryStore>,
    /// Substitutes environment variables
    pub resolver: Arc<dyn EnvironmentResolver>,
    /// Stored requests and projects
    pub store: Arc<dyn RequestStore>,
    /// Time source for dispatch and completion timestamps
    pub clock: Arc<dyn Clock>,
    /// Builds wire requests
    pub builder: RequestBuilder,
}

impl ExecutionEnvironment {
    /// Environment with a passthrough resolver, the system clock, and a
    /// default builder
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistoryStore>,
        store: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            transport,
            history,
            resolver: Arc::new(PassthroughResolver),
            store,
            clock: Arc::new(SystemClock),
            builder: RequestBuilder::default(),
        }
    }

    /// Use a different transport
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Use a different variable resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn EnvironmentResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different request builder
    #[must_use]
    pub fn with_builder(mut self, builder: RequestBuilder) -> Self {
        self.builder = builder;
        self
    }
}

impl fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}
