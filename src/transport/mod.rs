//! 出站边界：把物化好的批次与终态完成通知交给外部发送方。
//!
//! Outbound boundary of the pipeline.
//!
//! The pipeline never talks to the network itself; it hands materialized
//! batches and terminal completions to a [`ResultSender`], the collaborator
//! the host SDK supplies. [`ChannelSender`] is the in-process implementation
//! used by tests and embedding hosts.
//!
//! Partial sends are not retried here: the collaborator is assumed to retry
//! or fail fast on its own, and a failed partial send aborts the remaining
//! batches of that execution.

pub mod channel;

pub use channel::{ChannelSender, OutboundMessage};

use crate::error::CompletionCode;
use crate::types::{MessageId, PartyId, TableBatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of the result-sending collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The caller already finished or abandoned this exchange. An expected
    /// race, swallowed at the dispatcher boundary.
    #[error("exchange for message {0} already finished")]
    ExchangeClosed(MessageId),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Terminal outcome of one execution as reported to the caller.
///
/// Cancellation reports as success: the partial batches already delivered
/// were legitimate, the caller simply asked the stream to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CompletionCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CompletionStatus {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: None,
            message: None,
        }
    }

    pub fn failed(code: CompletionCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            message: Some(message.into()),
        }
    }
}

/// The caller-facing result sender.
///
/// Implementations must tolerate concurrent calls from many executions; the
/// pipeline serializes sends within one execution only.
#[async_trait::async_trait]
pub trait ResultSender: Send + Sync {
    /// Deliver one materialized batch for an exchange that is still open.
    ///
    /// `more_follows` declares that further batches may arrive for the same
    /// exchange; `success` flags this chunk as valid payload.
    async fn send_partial(
        &self,
        message_id: MessageId,
        batch: TableBatch,
        party: &PartyId,
        more_follows: bool,
        success: bool,
    ) -> Result<(), TransportError>;

    /// Deliver the terminal completion for an exchange. Called exactly once
    /// per execution, by the dispatcher only.
    async fn send_completion(
        &self,
        message_id: MessageId,
        status: CompletionStatus,
    ) -> Result<(), TransportError>;
}
