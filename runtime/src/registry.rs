//! Registry of live executions.
//!
//! At most one execution runs per request id. Starting a request that is
//! already running hands back the running execution; once an execution
//! reaches a terminal state it removes itself and the next start begins a
//! new round.

use crate::EngineConfig;
use crate::error::RegistryError;
use crate::manager::RequestManager;
use crate::metrics::ExecutionMetrics;
use courier_core::builder::RequestBuilder;
use courier_core::environment::ExecutionEnvironment;
use courier_core::event::ExecutionEvent;
use courier_core::machine::CancelReason;
use courier_core::request::{RequestId, RequestSpec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

/// Result of [`ExecutionRegistry::start`]
#[derive(Debug)]
pub struct Started {
    /// The execution handling the request
    pub manager: RequestManager,
    /// Events emitted from the moment of the call
    pub events: broadcast::Receiver<ExecutionEvent>,
    /// `true` when an already running execution was returned
    pub reused: bool,
}

struct RegistryInner {
    entries: Mutex<HashMap<RequestId, RequestManager>>,
    environment: ExecutionEnvironment,
    config: EngineConfig,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, RequestManager>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one [`RequestManager`] per request id
///
/// Cheap to clone; clones share the same entries.
///
/// # Example
///
/// ```ignore
/// let registry = ExecutionRegistry::with_config(environment, EngineConfig::from_env());
///
/// let started = registry.start(spec).await;
/// let phase = started.manager.wait().await?;
/// ```
#[derive(Clone)]
pub struct ExecutionRegistry {
    inner: Arc<RegistryInner>,
}

impl ExecutionRegistry {
    /// Registry with the default configuration
    #[must_use]
    pub fn new(environment: ExecutionEnvironment) -> Self {
        Self::with_config(environment, EngineConfig::default())
    }

    /// Registry with a custom configuration
    ///
    /// The configured default scheme replaces the environment builder's.
    #[must_use]
    pub fn with_config(environment: ExecutionEnvironment, config: EngineConfig) -> Self {
        let environment = environment
            .with_builder(RequestBuilder::with_default_scheme(config.default_scheme.clone()));
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                environment,
                config,
            }),
        }
    }

    /// Registry settings
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Execute `spec`, or join the execution already running for its id
    ///
    /// The returned receiver is subscribed before anything is emitted, so a
    /// fresh execution's `RequestDispatched` (or `RequestCancelled` when the
    /// request cannot be built) is always observed.
    #[tracing::instrument(skip(self, spec), name = "registry_start", fields(request_id = %spec.id))]
    pub async fn start(&self, spec: RequestSpec) -> Started {
        let (manager, events) = {
            let mut entries = self.inner.entries();
            if let Some(existing) = entries.get(&spec.id) {
                if !existing.is_terminal() {
                    tracing::debug!("Request already running, joining execution");
                    ExecutionMetrics::record_deduplicated();
                    // Subscribing under the lock orders this before the
                    // terminal events, which wait on deregistration.
                    return Started {
                        manager: existing.clone(),
                        events: existing.subscribe(),
                        reused: true,
                    };
                }
                tracing::debug!(
                    execution_id = %existing.execution_id(),
                    "Replacing finished execution"
                );
            }

            let manager = RequestManager::new(
                spec.clone(),
                self.inner.environment.clone(),
                &self.inner.config,
            );
            manager.on_terminal(self.deregistration(&spec.id, &manager));
            // Subscribed before `get` or `cancel` can reach it
            let events = manager.subscribe();
            entries.insert(spec.id.clone(), manager.clone());
            (manager, events)
        };

        ExecutionMetrics::record_started();
        let phase = manager.start().await;
        tracing::info!(execution_id = %manager.execution_id(), phase = %phase, "Execution started");

        Started {
            manager,
            events,
            reused: false,
        }
    }

    /// Load a request from storage and [`start`](Self::start) it
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownRequest`] when storage has no such request.
    pub async fn start_by_id(&self, id: &RequestId) -> Result<Started, RegistryError> {
        let spec = self
            .inner
            .environment
            .store
            .request(id)
            .ok_or_else(|| RegistryError::UnknownRequest(id.clone()))?;
        Ok(self.start(spec).await)
    }

    /// Removes the entry for `request_id` if it still holds this execution
    fn deregistration(
        &self,
        request_id: &RequestId,
        manager: &RequestManager,
    ) -> Box<dyn FnOnce() + Send> {
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let request_id = request_id.clone();
        let execution_id = manager.execution_id();
        Box::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut entries = registry.entries();
            if entries
                .get(&request_id)
                .is_some_and(|current| current.execution_id() == execution_id)
            {
                entries.remove(&request_id);
                tracing::debug!(request_id = %request_id, execution_id = %execution_id, "Execution deregistered");
            } else {
                tracing::trace!(request_id = %request_id, execution_id = %execution_id, "Stale deregistration ignored");
            }
        })
    }

    /// The running execution for `id`
    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<RequestManager> {
        self.inner.entries().get(id).cloned()
    }

    /// Cancel the running execution for `id`
    ///
    /// Returns `false` when nothing was running.
    pub async fn cancel(&self, id: &RequestId) -> bool {
        let Some(manager) = self.get(id) else {
            return false;
        };
        manager.cancel().await;
        true
    }

    /// Cancel every running execution with [`CancelReason::Shutdown`]
    ///
    /// Returns how many executions were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let managers: Vec<RequestManager> = self.inner.entries().values().cloned().collect();
        let count = managers.len();
        if count > 0 {
            tracing::info!(count, "Cancelling all executions");
        }
        futures::future::join_all(
            managers
                .iter()
                .map(|manager| manager.cancel_with(CancelReason::Shutdown)),
        )
        .await;
        count
    }

    /// Number of running executions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Whether nothing is running
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Ids of the running executions
    #[must_use]
    pub fn active_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.inner.entries().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("active", &self.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
