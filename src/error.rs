use crate::transport::TransportError;
use crate::types::{MessageId, QueryId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unified error type for the report pipeline.
///
/// This aggregates the failure modes of a single report execution plus the
/// dispatcher-level rejections. Cooperative cancellation travels through the
/// same channel as a distinguished variant so the batching combinator can
/// surface it as an outcome rather than a partial batch; it is never reported
/// to the caller as a failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The execution's cancellation token fired and was observed at a
    /// checkpoint. Translated into a clean success completion upstream.
    #[error("report execution cancelled")]
    Cancelled,

    /// A record producer failed while fetching or decoding records.
    #[error("producer error: {0}")]
    Producer(String),

    /// The row-filling function rejected a record, or a row did not match the
    /// report's column set.
    #[error("materialization error: {0}")]
    Materialize(String),

    /// Outbound send failure from the result-sending collaborator.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An execution for the same `(QueryId, MessageId)` key is already in
    /// flight. The first execution is left untouched.
    #[error("execution already in flight for query {query_id} / message {message_id}")]
    DuplicateExecution {
        query_id: QueryId,
        message_id: MessageId,
    },

    /// The dispatcher has been shut down and accepts no new queries.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Shared state corrupted by a panic elsewhere, e.g. a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the cooperative-cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// True when the caller already tore down the exchange this execution was
    /// feeding. Swallowed at the dispatcher boundary.
    pub fn is_exchange_closed(&self) -> bool {
        matches!(self, Error::Transport(TransportError::ExchangeClosed(_)))
    }
}

/// Error classification carried on failure completions.
///
/// The protocol only distinguishes broad classes; the human-readable message
/// on the completion carries the detail. Code strings are stable and safe to
/// match on across versions.
///
/// ## Example
///
/// ```rust
/// use report_stream::CompletionCode;
///
/// let code = CompletionCode::ReportError;
/// assert_eq!(code.code(), "R1001");
/// assert_eq!(code.category(), "report");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCode {
    /// R1001: producer or materialization failed while building a batch
    ReportError,
    /// R2001: a partial-batch send failed mid-stream
    TransportError,
    /// R9999: failure could not be classified
    Unknown,
}

impl CompletionCode {
    /// Returns the canonical code string (e.g., `"R1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReportError => "R1001",
            Self::TransportError => "R2001",
            Self::Unknown => "R9999",
        }
    }

    /// Broad category of the failure.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ReportError => "report",
            Self::TransportError => "transport",
            Self::Unknown => "unknown",
        }
    }

    /// Classify a pipeline error for the terminal completion.
    ///
    /// Cancellation and duplicate-key rejections never reach a failure
    /// completion, so they classify as `Unknown` here only as a backstop.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Producer(_) | Error::Materialize(_) => Self::ReportError,
            Error::Transport(_) => Self::TransportError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
