//! # Courier Testing
//!
//! Test doubles and helpers for the Courier request execution engine.
//!
//! This crate provides:
//! - Mock implementations of every collaborator trait
//! - Fixtures and a ready-made [`TestEnvironment`]
//! - The Given-When-Then [`ReducerTest`] harness and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use courier_testing::{TestEnvironment, fixtures};
//!
//! #[tokio::test]
//! async fn sends_request() {
//!     let harness = TestEnvironment::new();
//!     let registry = ExecutionRegistry::new(harness.environment());
//!
//!     let started = registry.start(fixtures::get_request("req-1", "example.com")).await;
//!     harness.transport.wait_for_pending(1).await;
//!     harness.transport.complete_next(Ok(TransportResponse::new(200, "{}")));
//! }
//! ```

use chrono::{DateTime, Utc};
use courier_core::environment::Clock;


/// Mock implementations of the collaborator traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use courier_core::environment::{
        Cancellable, CompletionListener, EnvironmentResolver, HistoryEntry, HistoryStore,
        RequestStore, Transport,
    };
    use courier_core::error::{PersistenceError, ResolveError};
    use courier_core::request::{HistoryId, Project, RequestId, RequestSpec, WorkspaceId};
    use courier_core::response::TransportResult;
    use courier_core::wire::WireRequest;
    use futures::future::BoxFuture;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_testing::mocks::FixedClock;
    /// use courier_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to
    ///
    /// Cloned clocks share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = lock(&self.time);
            *time += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *lock(&self.time)
        }
    }

    #[derive(Default)]
    struct TransportLog {
        requests: Vec<WireRequest>,
        pending: VecDeque<CompletionListener>,
        auto_reply: Option<TransportResult>,
    }

    /// Transport double
    ///
    /// Records every request. By default it holds on to the completion
    /// listener until the test completes it with [`complete_next`](Self::complete_next);
    /// a transport built with [`replying`](Self::replying) completes immediately.
    /// Cloned transports share the same log.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        log: Arc<Mutex<TransportLog>>,
        cancel_calls: Arc<AtomicUsize>,
    }

    impl MockTransport {
        /// A transport that waits for the test to complete each call
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A transport that completes every call with `result`
        #[must_use]
        pub fn replying(result: TransportResult) -> Self {
            let transport = Self::default();
            lock(&transport.log).auto_reply = Some(result);
            transport
        }

        /// Requests received so far, oldest first
        #[must_use]
        pub fn requests(&self) -> Vec<WireRequest> {
            lock(&self.log).requests.clone()
        }

        /// Number of requests received
        #[must_use]
        pub fn request_count(&self) -> usize {
            lock(&self.log).requests.len()
        }

        /// Number of calls still waiting for completion
        #[must_use]
        pub fn pending(&self) -> usize {
            lock(&self.log).pending.len()
        }

        /// Number of times a returned handle was cancelled
        #[must_use]
        pub fn cancel_calls(&self) -> usize {
            self.cancel_calls.load(Ordering::SeqCst)
        }

        /// Complete the oldest pending call
        ///
        /// Returns `false` when nothing was pending.
        pub fn complete_next(&self, result: TransportResult) -> bool {
            let listener = lock(&self.log).pending.pop_front();
            match listener {
                Some(listener) => {
                    listener.complete(result);
                    true
                },
                None => false,
            }
        }

        /// Drop every pending listener without completing it
        pub fn drop_pending(&self) {
            lock(&self.log).pending.clear();
        }

        /// Wait until at least `count` calls are pending
        ///
        /// Gives up after one second and returns `false`.
        pub async fn wait_for_pending(&self, count: usize) -> bool {
            self.wait_until(|log| log.pending.len() >= count).await
        }

        /// Wait until at least `count` requests were received
        ///
        /// Gives up after one second and returns `false`.
        pub async fn wait_for_requests(&self, count: usize) -> bool {
            self.wait_until(|log| log.requests.len() >= count).await
        }

        async fn wait_until(&self, condition: impl Fn(&TransportLog) -> bool) -> bool {
            let poll = async {
                while !condition(&lock(&self.log)) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            };
            tokio::time::timeout(Duration::from_secs(1), poll).await.is_ok()
        }
    }

    struct MockHandle {
        cancel_calls: Arc<AtomicUsize>,
    }

    impl Cancellable for MockHandle {
        fn cancel(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: WireRequest, listener: CompletionListener) -> Box<dyn Cancellable> {
            let auto_reply = {
                let mut log = lock(&self.log);
                log.requests.push(request);
                match log.auto_reply.clone() {
                    Some(result) => Some((listener, result)),
                    None => {
                        log.pending.push_back(listener);
                        None
                    },
                }
            };
            if let Some((listener, result)) = auto_reply {
                listener.complete(result);
            }
            Box::new(MockHandle {
                cancel_calls: Arc::clone(&self.cancel_calls),
            })
        }
    }

    /// In-memory history store
    ///
    /// Ids are `history-1`, `history-2`, ... Cloned stores share entries.
    #[derive(Clone, Default)]
    pub struct InMemoryHistory {
        entries: Arc<Mutex<Vec<HistoryEntry>>>,
        failing: Arc<AtomicBool>,
        next_id: Arc<AtomicU64>,
    }

    impl InMemoryHistory {
        /// An empty, working store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A store whose writes always fail
        #[must_use]
        pub fn failing() -> Self {
            let history = Self::default();
            history.set_failing(true);
            history
        }

        /// Make subsequent writes fail or succeed
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Stored entries, oldest first
        #[must_use]
        pub fn entries(&self) -> Vec<HistoryEntry> {
            lock(&self.entries).clone()
        }

        /// Number of stored entries
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.entries).len()
        }

        /// Whether nothing was stored
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.entries).is_empty()
        }
    }

    impl HistoryStore for InMemoryHistory {
        fn record(&self, entry: HistoryEntry) -> BoxFuture<'static, Result<HistoryId, PersistenceError>> {
            let history = self.clone();
            Box::pin(async move {
                if history.failing.load(Ordering::SeqCst) {
                    return Err(PersistenceError::Unavailable("history store offline".to_string()));
                }
                let id = history.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                lock(&history.entries).push(entry);
                Ok(HistoryId::new(format!("history-{id}")))
            })
        }
    }

    /// In-memory request and project storage
    #[derive(Clone, Default)]
    pub struct InMemoryRequestStore {
        requests: Arc<Mutex<HashMap<RequestId, RequestSpec>>>,
        projects: Arc<Mutex<HashMap<WorkspaceId, Project>>>,
    }

    impl InMemoryRequestStore {
        /// Empty storage
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Store a request
        pub fn insert_request(&self, spec: RequestSpec) {
            lock(&self.requests).insert(spec.id.clone(), spec);
        }

        /// Store a project
        pub fn insert_project(&self, project: Project) {
            lock(&self.projects).insert(project.workspace_id.clone(), project);
        }

        /// Same storage with `spec` added
        #[must_use]
        pub fn with_request(self, spec: RequestSpec) -> Self {
            self.insert_request(spec);
            self
        }

        /// Same storage with `project` added
        #[must_use]
        pub fn with_project(self, project: Project) -> Self {
            self.insert_project(project);
            self
        }
    }

    impl RequestStore for InMemoryRequestStore {
        fn request(&self, id: &RequestId) -> Option<RequestSpec> {
            lock(&self.requests).get(id).cloned()
        }

        fn project(&self, workspace_id: &WorkspaceId) -> Option<Project> {
            lock(&self.projects).get(workspace_id).cloned()
        }
    }

    /// Resolver that always fails with an unknown variable
    #[derive(Clone, Debug)]
    pub struct FailingResolver {
        variable: String,
    }

    impl FailingResolver {
        /// Fail on `variable`
        #[must_use]
        pub fn new(variable: impl Into<String>) -> Self {
            Self {
                variable: variable.into(),
            }
        }
    }

    impl EnvironmentResolver for FailingResolver {
        fn resolve(&self, _spec: &RequestSpec) -> Result<RequestSpec, ResolveError> {
            Err(ResolveError::UnknownVariable {
                name: self.variable.clone(),
            })
        }
    }

    /// Resolver substituting `{{name}}` tokens from a fixed map
    ///
    /// Tokens in the URL, header rows, and query rows are replaced. A token
    /// with no entry in the map fails resolution.
    #[derive(Clone, Debug, Default)]
    pub struct StaticResolver {
        variables: HashMap<String, String>,
    }

    impl StaticResolver {
        /// An empty resolver
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Define a variable
        #[must_use]
        pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.variables.insert(name.into(), value.into());
            self
        }

        fn substitute(&self, text: &str) -> Result<String, ResolveError> {
            let mut resolved = String::with_capacity(text.len());
            let mut rest = text;
            while let Some(start) = rest.find("{{") {
                let Some(end) = rest[start..].find("}}") else {
                    break;
                };
                let name = rest[start + 2..start + end].trim();
                let value = self.variables.get(name).ok_or_else(|| ResolveError::UnknownVariable {
                    name: name.to_string(),
                })?;
                resolved.push_str(&rest[..start]);
                resolved.push_str(value);
                rest = &rest[start + end + 2..];
            }
            resolved.push_str(rest);
            Ok(resolved)
        }
    }

    impl EnvironmentResolver for StaticResolver {
        fn resolve(&self, spec: &RequestSpec) -> Result<RequestSpec, ResolveError> {
            let mut resolved = spec.clone();
            resolved.url = self.substitute(&spec.url)?;
            for row in resolved.headers.iter_mut().chain(resolved.params.iter_mut()) {
                row.key = self.substitute(&row.key)?;
                row.value = self.substitute(&row.value)?;
            }
            Ok(resolved)
        }
    }
}

/// Fixtures and a ready-made test environment
pub mod helpers {
    use crate::mocks::{InMemoryHistory, InMemoryRequestStore, ManualClock, MockTransport};
    use courier_core::environment::ExecutionEnvironment;
    use courier_core::request::{HttpMethod, Project, RequestSpec};
    use std::sync::Arc;

    /// Workspace used by all fixtures
    pub const WORKSPACE: &str = "ws-test";

    /// A `GET` request in the fixture workspace
    #[must_use]
    pub fn get_request(id: &str, url: &str) -> RequestSpec {
        RequestSpec::new(id, WORKSPACE, HttpMethod::get(), url)
    }

    /// The fixture workspace's project
    #[must_use]
    pub fn project() -> Project {
        Project::new(WORKSPACE)
    }

    /// Doubles for every collaborator, kept around for assertions
    #[derive(Clone)]
    pub struct TestEnvironment {
        /// Transport double
        pub transport: MockTransport,
        /// History double
        pub history: InMemoryHistory,
        /// Storage double, pre-loaded with the fixture project
        pub store: InMemoryRequestStore,
        /// Shared manual clock
        pub clock: ManualClock,
    }

    impl TestEnvironment {
        /// Fresh doubles with a transport that waits for the test
        #[must_use]
        pub fn new() -> Self {
            Self::with_transport(MockTransport::new())
        }

        /// Fresh doubles around the given transport
        #[must_use]
        pub fn with_transport(transport: MockTransport) -> Self {
            Self {
                transport,
                history: InMemoryHistory::new(),
                store: InMemoryRequestStore::new().with_project(project()),
                clock: ManualClock::default(),
            }
        }

        /// Execution environment wired to these doubles
        #[must_use]
        pub fn environment(&self) -> ExecutionEnvironment {
            ExecutionEnvironment::new(
                Arc::new(self.transport.clone()),
                Arc::new(self.history.clone()),
                Arc::new(self.store.clone()),
            )
            .with_clock(Arc::new(self.clock.clone()))
        }
    }

    impl Default for TestEnvironment {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Install a `tracing` subscriber honouring `RUST_LOG`
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Fixture constructors
pub use helpers as fixtures;

// Re-export commonly used items
pub use helpers::{TestEnvironment, init_tracing};
pub use mocks::{
    FailingResolver, FixedClock, InMemoryHistory, InMemoryRequestStore, ManualClock,
    MockTransport, StaticResolver, test_clock,
};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::environment::{
        CompletionListener, EnvironmentResolver, HistoryStore, RequestStore, Transport,
    };
    use courier_core::error::{PersistenceError, ResolveError, TransportError};
    use courier_core::request::{Param, RequestId};
    use courier_core::response::TransportResponse;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_advances_all_clones() {
        let clock = ManualClock::default();
        let shared = clock.clone();
        let start = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(shared.now() - start, chrono::Duration::milliseconds(250));
    }

    #[allow(clippy::expect_used)] // Panics: Test will fail if the fixture URL does not parse
    fn wire() -> courier_core::wire::WireRequest {
        courier_core::wire::WireRequest {
            url: "http://example.com/".parse().expect("fixture URL should parse"),
            method: courier_core::request::HttpMethod::get(),
            headers: courier_core::wire::HeaderMap::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn manual_transport_holds_listeners_until_completed() {
        let transport = MockTransport::new();
        let (listener, receiver) = CompletionListener::channel();
        let handle = transport.send(wire(), listener);

        assert_eq!(transport.pending(), 1);
        assert!(transport.complete_next(Ok(TransportResponse::new(204, ""))));
        assert!(!transport.complete_next(Err(TransportError::Timeout)));
        assert_eq!(receiver.await.map(|r| r.map(|resp| resp.status)), Ok(Ok(204)));

        handle.cancel();
        assert_eq!(transport.cancel_calls(), 1);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn replying_transport_completes_immediately() {
        let transport = MockTransport::replying(Err(TransportError::Network("refused".into())));
        let (listener, receiver) = CompletionListener::channel();
        let _handle = transport.send(wire(), listener);

        assert_eq!(transport.pending(), 0);
        assert_eq!(receiver.await, Ok(Err(TransportError::Network("refused".into()))));
    }

    #[test]
    fn history_can_be_switched_to_failing() {
        let history = InMemoryHistory::new();
        let entry = courier_core::environment::HistoryEntry {
            request_id: RequestId::new("r"),
            workspace_id: helpers::WORKSPACE.into(),
            request: wire(),
            response: courier_core::response::ResponseRecord::from_transport(
                Err(TransportError::Timeout),
                Duration::ZERO,
            ),
            dispatched_at: test_clock().now(),
            completed_at: test_clock().now(),
        };

        let stored = tokio_test::block_on(history.record(entry.clone()));
        assert_eq!(stored.map(|id| id.to_string()), Ok("history-1".to_string()));

        history.set_failing(true);
        let refused = tokio_test::block_on(history.record(entry));
        assert!(matches!(refused, Err(PersistenceError::Unavailable(_))));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn static_resolver_substitutes_tokens() {
        let resolver = StaticResolver::new()
            .with_variable("host", "api.example.com")
            .with_variable("token", "s3cret");
        let spec = fixtures::get_request("r", "{{host}}/v1")
            .with_header(Param::new("Authorization", "Bearer {{ token }}"));

        let resolved = resolver.resolve(&spec);
        assert_eq!(resolved.as_ref().map(|s| s.url.as_str()), Ok("api.example.com/v1"));
        assert_eq!(
            resolved.map(|s| s.headers[0].value.clone()),
            Ok("Bearer s3cret".to_string())
        );
    }

    #[test]
    fn static_resolver_fails_on_unknown_token() {
        let spec = fixtures::get_request("r", "{{missing}}/v1");
        assert_eq!(
            StaticResolver::new().resolve(&spec),
            Err(ResolveError::UnknownVariable {
                name: "missing".into()
            })
        );
    }

    #[test]
    fn store_serves_fixture_project() {
        let harness = TestEnvironment::new();
        assert!(harness.store.project(&helpers::WORKSPACE.into()).is_some());
        assert!(harness.store.request(&RequestId::new("nope")).is_none());
    }
}
