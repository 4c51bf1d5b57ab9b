//! The per-execution runtime.
//!
//! A [`RequestManager`] owns one [`Execution`], feeds actions through the
//! [`ExecutionReducer`] one at a time, and executes the effects it returns.
//! Effects that produce actions feed them back through [`RequestManager::send`],
//! so transport completion and history persistence travel the same serialized
//! path as caller actions.

use crate::EngineConfig;
use crate::error::RegistryError;
use crate::metrics::{EffectMetrics, ExecutionMetrics};
use courier_core::effect::{Effect, EffectId};
use courier_core::environment::ExecutionEnvironment;
use courier_core::error::TransportError;
use courier_core::event::ExecutionEvent;
use courier_core::machine::{
    CancelReason, Execution, ExecutionAction, ExecutionReducer, Phase, TRANSPORT_EFFECT,
};
use courier_core::reducer::Reducer;
use courier_core::request::{RequestId, RequestSpec};
use courier_core::response::{ResponseRecord, TransportResponse, TransportResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// One-shot hook run when the execution first becomes terminal
pub(crate) type TerminalCallback = Box<dyn FnOnce() + Send>;

/// Cancellable effects of one execution
#[derive(Default)]
struct InFlight {
    running: HashMap<EffectId, AbortHandle>,
    /// Cancels that arrived before their effect was started
    cancelled: HashSet<EffectId>,
}

struct Inner {
    execution_id: Uuid,
    request_id: RequestId,
    state: RwLock<Execution>,
    reducer: ExecutionReducer,
    environment: ExecutionEnvironment,
    phase: watch::Sender<Phase>,
    events: broadcast::Sender<ExecutionEvent>,
    in_flight: Mutex<InFlight>,
    on_terminal: Mutex<Option<TerminalCallback>>,
    terminal_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime for one execution of a request
///
/// Cheap to clone; clones share the execution.
///
/// # Example
///
/// ```ignore
/// let started = registry.start(spec).await;
/// let mut events = started.events;
/// while let Ok(event) = events.recv().await {
///     println!("{}", event.name());
///     if event.is_terminal() {
///         break;
///     }
/// }
/// ```
#[derive(Clone)]
pub struct RequestManager {
    inner: Arc<Inner>,
}

impl RequestManager {
    /// Create a manager in `Preparing`
    ///
    /// Nothing happens until it receives [`ExecutionAction::Start`].
    #[must_use]
    pub fn new(spec: RequestSpec, environment: ExecutionEnvironment, config: &EngineConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Preparing);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                execution_id: Uuid::new_v4(),
                request_id: spec.id.clone(),
                state: RwLock::new(Execution::new(spec)),
                reducer: ExecutionReducer,
                environment,
                phase,
                events,
                in_flight: Mutex::new(InFlight::default()),
                on_terminal: Mutex::new(None),
                terminal_timeout: config.terminal_timeout,
            }),
        }
    }

    /// Install the deregistration hook
    ///
    /// Runs at most once, before the terminal state's effects execute. If the
    /// execution is already terminal it runs immediately.
    pub(crate) fn on_terminal(&self, callback: TerminalCallback) {
        if self.is_terminal() {
            callback();
            return;
        }
        *lock(&self.inner.on_terminal) = Some(callback);
    }

    /// Drive the execution out of `Preparing`
    pub(crate) async fn start(&self) -> Phase {
        self.send(ExecutionAction::Start).await
    }

    /// Send an action to the execution
    ///
    /// The reducer runs under the state's write lock, and the new phase, the
    /// deregistration hook and the returned effects are all handled before
    /// the lock is released, so observers never see a phase or an event out
    /// of order with the state. Returns the phase after the action was
    /// reduced. Actions the transition table refuses leave the state as it
    /// was.
    pub async fn send(&self, action: ExecutionAction) -> Phase {
        self.reduce(action).await.1
    }

    /// Reduce one action, returning the phase before and after it
    #[tracing::instrument(
        skip(self, action),
        name = "execution_send",
        fields(request_id = %self.inner.request_id, action = action.name())
    )]
    async fn reduce(&self, action: ExecutionAction) -> (Phase, Phase) {
        let mut state = self.inner.state.write().await;
        let before = state.phase();
        let rejected_before = state.rejected_transitions;

        let start = Instant::now();
        let effects = self
            .inner
            .reducer
            .reduce(&mut state, action, &self.inner.environment);
        EffectMetrics::record_reduce(start.elapsed());

        let after = state.phase();
        if state.rejected_transitions > rejected_before {
            ExecutionMetrics::record_rejected(before);
        }
        if before != after {
            ExecutionMetrics::record_phase(after);
            if let (Some(dispatched), Some(completed)) = (state.dispatched_at, state.completed_at) {
                if let Ok(elapsed) = (completed - dispatched).to_std() {
                    ExecutionMetrics::record_response(elapsed);
                }
            }
            self.inner.phase.send_replace(after);

            if after.is_terminal() {
                let callback = lock(&self.inner.on_terminal).take();
                if let Some(callback) = callback {
                    callback();
                }
            }
        }

        tracing::trace!(count = effects.len(), "Executing effects");
        for effect in effects {
            self.execute_effect(effect);
        }
        drop(state);
        (before, after)
    }

    fn execute_effect(&self, effect: Effect<ExecutionAction>) {
        EffectMetrics::record_effect(effect.kind());
        match effect {
            Effect::None => {},
            Effect::Future(fut) => {
                let manager = self.clone();
                tokio::spawn(async move {
                    if let Some(action) = fut.await {
                        manager.send(action).await;
                    }
                });
            },
            Effect::Cancellable { id, effect } => {
                let mut in_flight = lock(&self.inner.in_flight);
                if in_flight.cancelled.remove(&id) {
                    tracing::debug!(effect = %id, "Effect cancelled before it started");
                    return;
                }
                match *effect {
                    Effect::Future(fut) => {
                        let manager = self.clone();
                        let task = tokio::spawn(async move {
                            let action = fut.await;
                            lock(&manager.inner.in_flight).running.remove(&id);
                            if let Some(action) = action {
                                manager.send(action).await;
                            }
                        });
                        in_flight.running.insert(id, task.abort_handle());
                    },
                    other => {
                        drop(in_flight);
                        self.execute_effect(other);
                    },
                }
            },
            Effect::Cancel(id) => {
                let mut in_flight = lock(&self.inner.in_flight);
                if let Some(handle) = in_flight.running.remove(&id) {
                    tracing::debug!(effect = %id, "Aborting effect");
                    handle.abort();
                } else {
                    in_flight.cancelled.insert(id);
                }
            },
            Effect::Emit(event) => {
                tracing::debug!(event = event.name(), "Emitting event");
                // No subscribers is fine
                let _ = self.inner.events.send(event);
            },
        }
    }

    /// Stop the execution
    ///
    /// Aborts the transport call when one is in flight. A terminal execution
    /// is left as it is.
    pub async fn cancel(&self) {
        self.cancel_with(CancelReason::ByCaller).await;
    }

    pub(crate) async fn cancel_with(&self, reason: CancelReason) {
        if self.is_terminal() {
            tracing::debug!(request_id = %self.inner.request_id, "Cancel ignored, execution finished");
            return;
        }
        self.send(ExecutionAction::Cancel(reason)).await;
    }

    /// Complete the execution with a response delivered out of band
    ///
    /// The transport call still in flight, if any, is aborted, and one that
    /// has not been started yet never will be. Refused unless the execution
    /// is `Sending`.
    pub async fn complete_with_response(&self, response: TransportResponse) {
        self.complete(Ok(response)).await;
    }

    /// Complete the execution with a transport failure delivered out of band
    ///
    /// See [`complete_with_response`](Self::complete_with_response).
    pub async fn complete_with_error(&self, error: TransportError) {
        self.complete(Err(error)).await;
    }

    async fn complete(&self, result: TransportResult) {
        let (before, after) = self
            .reduce(ExecutionAction::TransportFinished(result))
            .await;
        if before == Phase::Sending && after == Phase::Completed {
            self.execute_effect(Effect::Cancel(TRANSPORT_EFFECT));
        }
    }

    /// Snapshot of the execution state
    pub async fn state(&self) -> Execution {
        self.inner.state.read().await.clone()
    }

    /// The captured response, once `Completed`
    pub async fn response(&self) -> Option<ResponseRecord> {
        self.inner.state.read().await.response().cloned()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Whether the execution has finished
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Subscribe to this execution's events
    ///
    /// Only events emitted after the call are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the execution reaches `Completed` or `Cancelled`
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Timeout`] if it is still running after
    /// `timeout`.
    pub async fn wait_for_terminal(&self, timeout: Duration) -> Result<Phase, RegistryError> {
        let mut phase = self.inner.phase.subscribe();
        let terminal = async {
            match phase.wait_for(|phase| phase.is_terminal()).await {
                Ok(phase) => *phase,
                // The sender lives as long as `self`
                Err(_) => self.phase(),
            }
        };
        tokio::time::timeout(timeout, terminal)
            .await
            .map_err(|_| RegistryError::Timeout {
                request_id: self.inner.request_id.clone(),
                timeout,
            })
    }

    /// Wait for a terminal state using the configured timeout
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Timeout`] if the execution does not finish in time.
    pub async fn wait(&self) -> Result<Phase, RegistryError> {
        self.wait_for_terminal(self.inner.terminal_timeout).await
    }

    /// Identifies this round of the request
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.inner.execution_id
    }

    /// Request being executed
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.inner.request_id
    }

    /// Whether both handles refer to the same execution
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("execution_id", &self.inner.execution_id)
            .field("request_id", &self.inner.request_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
