//! Events published by an execution.

use crate::machine::CancelReason;
use crate::request::{HistoryId, RequestId};
use crate::response::ResponseRecord;
use serde::{Deserialize, Serialize};

/// Something observers of an execution should know about
///
/// Each execution publishes at most one terminal event
/// ([`ResponseReceived`](Self::ResponseReceived) or
/// [`RequestCancelled`](Self::RequestCancelled)).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The wire request was handed to the transport
    RequestDispatched {
        /// Request being executed
        request_id: RequestId,
    },

    /// A response record is available and has been offered to history
    ResponseReceived {
        /// Request being executed
        request_id: RequestId,
        /// The captured response
        record: Box<ResponseRecord>,
        /// History entry id; `None` when persistence failed
        history_id: Option<HistoryId>,
    },

    /// The execution ended without a response
    RequestCancelled {
        /// Request being executed
        request_id: RequestId,
        /// Why it ended
        reason: CancelReason,
    },

    /// Environment variables could not be substituted; the request was sent unresolved
    ExtrapolationFailed {
        /// Request being executed
        request_id: RequestId,
        /// Resolver error message
        message: String,
    },
}

impl ExecutionEvent {
    /// The request this event belongs to
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestDispatched { request_id }
            | Self::ResponseReceived { request_id, .. }
            | Self::RequestCancelled { request_id, .. }
            | Self::ExtrapolationFailed { request_id, .. } => request_id,
        }
    }

    /// Whether this is the last lifecycle event of its execution
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResponseReceived { .. } | Self::RequestCancelled { .. }
        )
    }

    /// Event name, as used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestDispatched { .. } => "request_dispatched",
            Self::ResponseReceived { .. } => "response_received",
            Self::RequestCancelled { .. } => "request_cancelled",
            Self::ExtrapolationFailed { .. } => "extrapolation_failed",
        }
    }
}
