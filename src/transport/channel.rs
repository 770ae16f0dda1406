//! In-process result sender backed by a tokio mpsc channel.

use super::{CompletionStatus, ResultSender, TransportError};
use crate::types::{MessageId, PartyId, TableBatch};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Everything a [`ChannelSender`] pushes to its receiver.
#[derive(Debug)]
pub enum OutboundMessage {
    Partial {
        message_id: MessageId,
        party: PartyId,
        batch: TableBatch,
        more_follows: bool,
        success: bool,
    },
    Completion {
        message_id: MessageId,
        status: CompletionStatus,
    },
}

impl OutboundMessage {
    pub fn message_id(&self) -> MessageId {
        match self {
            OutboundMessage::Partial { message_id, .. }
            | OutboundMessage::Completion { message_id, .. } => *message_id,
        }
    }
}

/// [`ResultSender`] that forwards everything into one mpsc channel.
///
/// A completion closes its exchange; any later send for the same message id
/// fails with [`TransportError::ExchangeClosed`]. Hosts can also close an
/// exchange early via [`close_exchange`](Self::close_exchange) to model a
/// caller that abandoned the request.
pub struct ChannelSender {
    tx: mpsc::Sender<OutboundMessage>,
    closed: Mutex<HashSet<MessageId>>,
}

impl ChannelSender {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed: Mutex::new(HashSet::new()),
            },
            rx,
        )
    }

    /// Mark an exchange as finished from the caller's side. Subsequent sends
    /// for this message id fail with [`TransportError::ExchangeClosed`].
    pub fn close_exchange(&self, message_id: MessageId) {
        if let Ok(mut closed) = self.closed.lock() {
            closed.insert(message_id);
        }
    }

    fn check_open(&self, message_id: MessageId) -> Result<(), TransportError> {
        let closed = self
            .closed
            .lock()
            .map_err(|_| TransportError::SendFailed("closed-exchange set poisoned".to_string()))?;
        if closed.contains(&message_id) {
            Err(TransportError::ExchangeClosed(message_id))
        } else {
            Ok(())
        }
    }

    fn mark_closed(&self, message_id: MessageId) -> Result<(), TransportError> {
        self.closed
            .lock()
            .map_err(|_| TransportError::SendFailed("closed-exchange set poisoned".to_string()))?
            .insert(message_id);
        Ok(())
    }

    async fn forward(&self, msg: OutboundMessage) -> Result<(), TransportError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| TransportError::Unavailable("receiver dropped".to_string()))
    }
}

#[async_trait::async_trait]
impl ResultSender for ChannelSender {
    async fn send_partial(
        &self,
        message_id: MessageId,
        batch: TableBatch,
        party: &PartyId,
        more_follows: bool,
        success: bool,
    ) -> Result<(), TransportError> {
        self.check_open(message_id)?;
        self.forward(OutboundMessage::Partial {
            message_id,
            party: party.clone(),
            batch,
            more_follows,
            success,
        })
        .await
    }

    async fn send_completion(
        &self,
        message_id: MessageId,
        status: CompletionStatus,
    ) -> Result<(), TransportError> {
        self.check_open(message_id)?;
        // Terminal: the exchange is over once the completion is out.
        self.mark_closed(message_id)?;
        self.forward(OutboundMessage::Completion { message_id, status })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReportType, TableSchema};
    use std::sync::Arc;

    fn empty_batch() -> TableBatch {
        let schema = Arc::new(TableSchema::new(ReportType::new("activity_log"), ["ts"]));
        TableBatch::new(schema, 0)
    }

    #[tokio::test]
    async fn test_partial_then_completion_in_order() {
        let (sender, mut rx) = ChannelSender::new(8);
        let message_id = MessageId::new();
        let party = PartyId::new("console-1");

        sender
            .send_partial(message_id, empty_batch(), &party, true, true)
            .await
            .unwrap();
        sender
            .send_completion(message_id, CompletionStatus::succeeded())
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundMessage::Partial { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundMessage::Completion { status, .. } if status.success
        ));
    }

    #[tokio::test]
    async fn test_completion_closes_exchange() {
        let (sender, mut rx) = ChannelSender::new(8);
        let message_id = MessageId::new();
        let party = PartyId::new("console-1");

        sender
            .send_completion(message_id, CompletionStatus::succeeded())
            .await
            .unwrap();
        let err = sender
            .send_partial(message_id, empty_batch(), &party, true, true)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ExchangeClosed(message_id));

        // Only the completion made it through.
        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundMessage::Completion { .. }
        ));
    }

    #[tokio::test]
    async fn test_close_exchange_rejects_completion() {
        let (sender, _rx) = ChannelSender::new(8);
        let message_id = MessageId::new();
        sender.close_exchange(message_id);

        let err = sender
            .send_completion(message_id, CompletionStatus::succeeded())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ExchangeClosed(message_id));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_unavailable() {
        let (sender, rx) = ChannelSender::new(1);
        drop(rx);
        let err = sender
            .send_completion(MessageId::new(), CompletionStatus::succeeded())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }
}
