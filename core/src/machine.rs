//! Execution state machine.
//!
//! [`ExecutionState::transition`] is the complete transition table.
//! [`ExecutionReducer`] drives an [`Execution`] through it and describes the
//! entry action of each state as effects:
//!
//! | state | on entry |
//! |---|---|
//! | `Preparing` | resolve variables, look up the project, build the wire request |
//! | `Sending` | hand the wire request to the transport (cancellable), emit `RequestDispatched` |
//! | `Completed` | persist to history, then emit `ResponseReceived` |
//! | `Cancelled` | abort the transport call, emit `RequestCancelled` |

use crate::effect::{Effect, EffectId};
use crate::environment::{Cancellable, CompletionListener, ExecutionEnvironment, HistoryEntry};
use crate::error::{BuilderError, TransportError};
use crate::event::ExecutionEvent;
use crate::reducer::Reducer;
use crate::request::{HistoryId, RequestId, RequestSpec};
use crate::response::{ResponseRecord, TransportResult};
use crate::wire::WireRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Id of the cancellable transport effect
pub const TRANSPORT_EFFECT: EffectId = EffectId::new("transport");

type Effects = SmallVec<[Effect<ExecutionAction>; 4]>;

/// Why an execution ended without a response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "error", rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller cancelled it
    ByCaller,
    /// The wire request could not be built; nothing was sent
    BuildFailed(BuilderError),
    /// The registry was shut down
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByCaller => f.write_str("cancelled by caller"),
            Self::BuildFailed(error) => write!(f, "build failed: {error}"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Payload-free view of [`ExecutionState`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Building the wire request
    Preparing,
    /// Waiting for the transport
    Sending,
    /// Response captured
    Completed,
    /// Ended without a response
    Cancelled,
}

impl Phase {
    /// `Completed` and `Cancelled` have no outgoing transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Lower-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an execution is in its lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "data", rename_all = "snake_case")]
pub enum ExecutionState {
    /// Building the wire request
    #[default]
    Preparing,
    /// Waiting for the transport to answer this request
    Sending(WireRequest),
    /// Finished with a response
    Completed(Box<ResponseRecord>),
    /// Finished without a response
    Cancelled(CancelReason),
}

/// Input to the transition table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Wire request built, hand it to the transport
    Send(WireRequest),
    /// Transport reported back
    Complete(Box<ResponseRecord>),
    /// Stop without a response
    Cancel(CancelReason),
}

impl Transition {
    /// Short name, used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::Complete(_) => "complete",
            Self::Cancel(_) => "cancel",
        }
    }
}

/// A transition the table does not allow
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Transition '{transition}' is not valid from {from}")]
pub struct RejectedTransition {
    /// Phase the machine was in
    pub from: Phase,
    /// Name of the rejected transition or action
    pub transition: &'static str,
}

impl ExecutionState {
    /// The state's phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Preparing => Phase::Preparing,
            Self::Sending(_) => Phase::Sending,
            Self::Completed(_) => Phase::Completed,
            Self::Cancelled(_) => Phase::Cancelled,
        }
    }

    /// Whether the state has no outgoing transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Apply the transition table
    ///
    /// # Errors
    ///
    /// Returns [`RejectedTransition`] for any pair not in the table. `self`
    /// is left untouched either way.
    pub fn transition(&self, transition: Transition) -> Result<Self, RejectedTransition> {
        match (self, transition) {
            (Self::Preparing, Transition::Send(wire)) => Ok(Self::Sending(wire)),
            (Self::Sending(_), Transition::Complete(record)) => Ok(Self::Completed(record)),
            (Self::Preparing | Self::Sending(_), Transition::Cancel(reason)) => {
                Ok(Self::Cancelled(reason))
            },
            (state, transition) => Err(RejectedTransition {
                from: state.phase(),
                transition: transition.name(),
            }),
        }
    }
}

/// Everything that can happen to an execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionAction {
    /// Enter `Preparing`: resolve, build, and send
    Start,
    /// The transport reported an outcome
    TransportFinished(TransportResult),
    /// Stop the execution
    Cancel(CancelReason),
    /// History persistence finished (`None` when it failed)
    HistoryRecorded {
        /// Id of the stored entry
        history_id: Option<HistoryId>,
    },
}

impl ExecutionAction {
    /// Short name, used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TransportFinished(_) => "transport_finished",
            Self::Cancel(_) => "cancel",
            Self::HistoryRecorded { .. } => "history_recorded",
        }
    }
}

/// State of one execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    /// The spec as it was submitted (never the resolved copy)
    pub spec: RequestSpec,
    /// Lifecycle state
    pub state: ExecutionState,
    /// When the wire request was handed to the transport
    pub dispatched_at: Option<DateTime<Utc>>,
    /// When the transport reported back
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether `ResponseReceived` has been emitted
    pub response_delivered: bool,
    /// Actions the transition table refused
    pub rejected_transitions: u64,
}

impl Execution {
    /// A fresh execution in `Preparing`
    #[must_use]
    pub const fn new(spec: RequestSpec) -> Self {
        Self {
            spec,
            state: ExecutionState::Preparing,
            dispatched_at: None,
            completed_at: None,
            response_delivered: false,
            rejected_transitions: 0,
        }
    }

    /// Request being executed
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.spec.id
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Whether the execution has finished
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The captured response, once `Completed`
    #[must_use]
    pub fn response(&self) -> Option<&ResponseRecord> {
        match &self.state {
            ExecutionState::Completed(record) => Some(record),
            _ => None,
        }
    }

    /// The cancel reason, once `Cancelled`
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match &self.state {
            ExecutionState::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    fn reject(&mut self, rejected: RejectedTransition) -> Effects {
        self.rejected_transitions += 1;
        tracing::warn!(
            request_id = %self.spec.id,
            from = %rejected.from,
            transition = rejected.transition,
            "Rejected transition"
        );
        SmallVec::new()
    }

    fn apply(&mut self, transition: Transition) -> Result<Phase, RejectedTransition> {
        let from = self.phase();
        let name = transition.name();
        self.state = self.state.transition(transition)?;
        tracing::debug!(
            request_id = %self.spec.id,
            from = %from,
            to = %self.phase(),
            transition = name,
            "Execution transitioned"
        );
        Ok(from)
    }
}

/// Aborts the transport call if the effect is dropped before it reports
struct CancelOnDrop(Option<Box<dyn Cancellable>>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

/// Reducer for a single execution
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecutionReducer;

impl ExecutionReducer {
    fn start(state: &mut Execution, env: &ExecutionEnvironment) -> Effects {
        if state.phase() != Phase::Preparing {
            return state.reject(RejectedTransition {
                from: state.phase(),
                transition: "start",
            });
        }

        let mut effects = Effects::new();
        let resolved = match env.resolver.resolve(&state.spec) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::warn!(
                    request_id = %state.spec.id,
                    error = %error,
                    "Variable substitution failed, sending request unresolved"
                );
                effects.push(Effect::Emit(ExecutionEvent::ExtrapolationFailed {
                    request_id: state.spec.id.clone(),
                    message: error.to_string(),
                }));
                state.spec.clone()
            },
        };

        let project = env.store.project(&resolved.workspace_id);
        match env.builder.build(&resolved, project.as_ref()) {
            Ok(wire) => effects.extend(Self::enter_sending(state, wire, env)),
            Err(error) => {
                tracing::debug!(
                    request_id = %state.spec.id,
                    error = %error,
                    "Request could not be built"
                );
                effects.extend(Self::enter_cancelled(state, CancelReason::BuildFailed(error)));
            },
        }
        effects
    }

    fn enter_sending(
        state: &mut Execution,
        wire: WireRequest,
        env: &ExecutionEnvironment,
    ) -> Effects {
        if let Err(rejected) = state.apply(Transition::Send(wire.clone())) {
            return state.reject(rejected);
        }
        state.dispatched_at = Some(env.clock.now());

        let transport = Arc::clone(&env.transport);
        let send = Effect::Future(Box::pin(async move {
            let (listener, receiver) = CompletionListener::channel();
            let guard = CancelOnDrop(Some(transport.send(wire, listener)));
            let result = receiver.await.unwrap_or(Err(TransportError::Cancelled));
            guard.disarm();
            Some(ExecutionAction::TransportFinished(result))
        }));

        smallvec![
            Effect::Emit(ExecutionEvent::RequestDispatched {
                request_id: state.spec.id.clone(),
            }),
            Effect::cancellable(TRANSPORT_EFFECT, send),
        ]
    }

    fn transport_finished(
        state: &mut Execution,
        result: TransportResult,
        env: &ExecutionEnvironment,
    ) -> Effects {
        let ExecutionState::Sending(wire) = &state.state else {
            return state.reject(RejectedTransition {
                from: state.phase(),
                transition: "complete",
            });
        };
        let request = wire.clone();

        let completed_at = env.clock.now();
        let dispatched_at = state.dispatched_at.unwrap_or(completed_at);
        let elapsed = (completed_at - dispatched_at).to_std().unwrap_or_default();
        let record = ResponseRecord::from_transport(result, elapsed);

        let entry = HistoryEntry {
            request_id: state.spec.id.clone(),
            workspace_id: state.spec.workspace_id.clone(),
            request,
            response: record.clone(),
            dispatched_at,
            completed_at,
        };

        if let Err(rejected) = state.apply(Transition::Complete(Box::new(record))) {
            return state.reject(rejected);
        }
        state.completed_at = Some(completed_at);

        let history = Arc::clone(&env.history);
        let request_id = state.spec.id.clone();
        smallvec![Effect::Future(Box::pin(async move {
            let history_id = match history.record(entry).await {
                Ok(id) => Some(id),
                Err(error) => {
                    tracing::warn!(
                        request_id = %request_id,
                        error = %error,
                        "Failed to persist history entry"
                    );
                    None
                },
            };
            Some(ExecutionAction::HistoryRecorded { history_id })
        }))]
    }

    fn history_recorded(state: &mut Execution, history_id: Option<HistoryId>) -> Effects {
        let ExecutionState::Completed(record) = &state.state else {
            return state.reject(RejectedTransition {
                from: state.phase(),
                transition: "history_recorded",
            });
        };
        if state.response_delivered {
            tracing::debug!(request_id = %state.spec.id, "Response already delivered");
            return SmallVec::new();
        }

        let event = ExecutionEvent::ResponseReceived {
            request_id: state.spec.id.clone(),
            record: record.clone(),
            history_id,
        };
        state.response_delivered = true;
        smallvec![Effect::Emit(event)]
    }

    fn cancel(state: &mut Execution, reason: CancelReason) -> Effects {
        if state.phase() == Phase::Cancelled {
            tracing::debug!(request_id = %state.spec.id, "Execution already cancelled");
            return SmallVec::new();
        }
        Self::enter_cancelled(state, reason)
    }

    fn enter_cancelled(state: &mut Execution, reason: CancelReason) -> Effects {
        let from = match state.apply(Transition::Cancel(reason.clone())) {
            Ok(from) => from,
            Err(rejected) => return state.reject(rejected),
        };

        let mut effects = Effects::new();
        if from == Phase::Sending {
            effects.push(Effect::Cancel(TRANSPORT_EFFECT));
        }
        effects.push(Effect::Emit(ExecutionEvent::RequestCancelled {
            request_id: state.spec.id.clone(),
            reason,
        }));
        effects
    }
}

impl Reducer for ExecutionReducer {
    type State = Execution;
    type Action = ExecutionAction;
    type Environment = ExecutionEnvironment;

    fn reduce(
        &self,
        state: &mut Execution,
        action: ExecutionAction,
        env: &ExecutionEnvironment,
    ) -> SmallVec<[Effect<ExecutionAction>; 4]> {
        match action {
            ExecutionAction::Start => Self::start(state, env),
            ExecutionAction::TransportFinished(result) => {
                Self::transport_finished(state, result, env)
            },
            ExecutionAction::Cancel(reason) => Self::cancel(state, reason),
            ExecutionAction::HistoryRecorded { history_id } => {
                Self::history_recorded(state, history_id)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HttpMethod;
    use url::Url;

    #[allow(clippy::expect_used)] // Panics: Test will fail if the fixture URL does not parse
    fn wire() -> WireRequest {
        WireRequest {
            url: Url::parse("http://example.com/").expect("fixture URL should parse"),
            method: HttpMethod::get(),
            headers: crate::wire::HeaderMap::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    fn record() -> Box<ResponseRecord> {
        Box::new(ResponseRecord::from_transport(
            Ok(crate::response::TransportResponse::new(200, "{}")),
            std::time::Duration::ZERO,
        ))
    }

    #[test]
    fn table_allows_only_forward_transitions() {
        let preparing = ExecutionState::Preparing;
        let sending = ExecutionState::Sending(wire());
        let completed = ExecutionState::Completed(record());
        let cancelled = ExecutionState::Cancelled(CancelReason::ByCaller);

        assert_eq!(preparing.transition(Transition::Send(wire())).map(|s| s.phase()), Ok(Phase::Sending));
        assert_eq!(
            preparing.transition(Transition::Cancel(CancelReason::Shutdown)).map(|s| s.phase()),
            Ok(Phase::Cancelled)
        );
        assert_eq!(sending.transition(Transition::Complete(record())).map(|s| s.phase()), Ok(Phase::Completed));
        assert_eq!(
            sending.transition(Transition::Cancel(CancelReason::ByCaller)).map(|s| s.phase()),
            Ok(Phase::Cancelled)
        );

        assert_eq!(
            preparing.transition(Transition::Complete(record())),
            Err(RejectedTransition {
                from: Phase::Preparing,
                transition: "complete"
            })
        );
        assert!(sending.transition(Transition::Send(wire())).is_err());
        for terminal in [&completed, &cancelled] {
            assert!(terminal.transition(Transition::Send(wire())).is_err());
            assert!(terminal.transition(Transition::Complete(record())).is_err());
            assert!(terminal.transition(Transition::Cancel(CancelReason::ByCaller)).is_err());
        }
    }

    #[test]
    fn terminal_phases() {
        assert!(!Phase::Preparing.is_terminal());
        assert!(!Phase::Sending.is_terminal());
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
    }

    #[test]
    fn rejected_transition_reads_well() {
        let rejected = RejectedTransition {
            from: Phase::Completed,
            transition: "cancel",
        };
        assert_eq!(rejected.to_string(), "Transition 'cancel' is not valid from completed");
    }

    #[test]
    fn execution_exposes_terminal_payloads() {
        let mut execution = Execution::new(RequestSpec::new("r", "w", HttpMethod::get(), "x"));
        assert!(execution.response().is_none());

        execution.state = ExecutionState::Cancelled(CancelReason::Shutdown);
        assert_eq!(execution.cancel_reason(), Some(&CancelReason::Shutdown));
        assert!(execution.is_terminal());

        execution.state = ExecutionState::Completed(record());
        assert_eq!(execution.response().map(|r| r.status_code), Some(200));
    }

    #[test]
    fn cancel_reason_display() {
        assert_eq!(CancelReason::ByCaller.to_string(), "cancelled by caller");
        assert_eq!(
            CancelReason::BuildFailed(BuilderError::NoBody).to_string(),
            "build failed: Request body has no content to send"
        );
    }
}
