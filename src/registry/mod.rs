//! 查询调度注册表：在飞行中的查询登记、取消路由与单次完成上报。
//!
//! # Query Dispatch Registry
//!
//! [`ReportDispatcher`] owns the set of currently-executing queries, keyed by
//! `(QueryId, MessageId)`, each associated with its cancellation token. It
//! routes inbound cancel requests to the right token and guarantees the
//! single-shot completion contract: exactly one terminal completion per
//! execution, whichever way it ends.
//!
//! The in-flight map is the only shared mutable state in the pipeline. It is
//! touched through exactly three operations - insert-if-absent at start,
//! signal-if-present on cancel, remove-unconditionally at finish - and never
//! exposed for iteration or read-modify-write from outside.

use crate::config::DispatchConfig;
use crate::error::CompletionCode;
use crate::pipeline::handler::{ExecutionContext, ReportHandler, RunOutcome, TypedReportHandler};
use crate::pipeline::RecordProducer;
use crate::transport::{CompletionStatus, ResultSender, TransportError};
use crate::types::{MessageId, PartyId, QueryId, QueryKey, ReportQuery, ReportType};
use crate::{Error, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Builder for [`ReportDispatcher`].
pub struct ReportDispatcherBuilder {
    handlers: HashMap<ReportType, Arc<dyn ReportHandler>>,
    sender: Option<Arc<dyn ResultSender>>,
    config: DispatchConfig,
}

impl ReportDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            sender: None,
            config: DispatchConfig::default(),
        }
    }

    /// Register a producer for a report type via the generic typed handler.
    pub fn register<P>(self, report_type: ReportType, producer: P) -> Self
    where
        P: RecordProducer + 'static,
    {
        self.with_handler(Arc::new(TypedReportHandler::new(report_type, producer)))
    }

    /// Register a pre-built handler under its own report type. Registering
    /// the same type twice keeps the later handler.
    pub fn with_handler(mut self, handler: Arc<dyn ReportHandler>) -> Self {
        self.handlers.insert(handler.report_type(), handler);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn ResultSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ReportDispatcher> {
        let sender = self.sender.ok_or_else(|| {
            Error::Configuration("a result sender is required".to_string())
        })?;
        Ok(ReportDispatcher {
            inner: Arc::new(DispatcherInner {
                handlers: self.handlers,
                sender,
                config: self.config,
                inflight: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

impl Default for ReportDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts "query arrived" and "cancel query" notifications and runs each
/// accepted query as an independent task.
///
/// Cheap to clone; clones share the same in-flight map and handler set.
#[derive(Clone)]
pub struct ReportDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    handlers: HashMap<ReportType, Arc<dyn ReportHandler>>,
    sender: Arc<dyn ResultSender>,
    config: DispatchConfig,
    inflight: Mutex<HashMap<QueryKey, CancellationToken>>,
    shutdown: CancellationToken,
}

impl ReportDispatcher {
    pub fn builder() -> ReportDispatcherBuilder {
        ReportDispatcherBuilder::new()
    }

    /// Accept an inbound query and start executing it asynchronously.
    ///
    /// A report type with no registered handler completes immediately as an
    /// empty success and registers nothing. A key already in flight is
    /// rejected with [`Error::DuplicateExecution`]; the live execution is
    /// untouched.
    pub fn start(&self, query: ReportQuery, message_id: MessageId, party: PartyId) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let Some(handler) = self.inner.handlers.get(&query.report_type).cloned() else {
            tracing::debug!(
                query_id = %query.id,
                report_type = %query.report_type,
                "no handler for report type, completing as empty"
            );
            let sender = Arc::clone(&self.inner.sender);
            tokio::spawn(async move {
                if let Err(e) = sender
                    .send_completion(message_id, CompletionStatus::succeeded())
                    .await
                {
                    log_completion_error(message_id, &e);
                }
            });
            return Ok(());
        };

        let key: QueryKey = (query.id, message_id);
        let cancel = self.inner.shutdown.child_token();
        {
            let mut inflight = self
                .inner
                .inflight
                .lock()
                .map_err(|_| Error::Internal("in-flight registry poisoned".to_string()))?;
            match inflight.entry(key) {
                Entry::Occupied(_) => {
                    return Err(Error::DuplicateExecution {
                        query_id: query.id,
                        message_id,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(cancel.clone());
                }
            }
        }

        let window = self
            .inner
            .config
            .override_for(&query.report_type)
            .or_else(|| handler.window())
            .unwrap_or_else(|| self.inner.config.default_window());

        tracing::debug!(
            query_id = %query.id,
            message_id = %message_id,
            report_type = %query.report_type,
            window,
            "starting report execution"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = handler
                .run(ExecutionContext {
                    query: &query,
                    message_id,
                    party: &party,
                    window,
                    sender: inner.sender.as_ref(),
                    cancel,
                })
                .await;
            inner.finish(query.id, message_id, outcome).await;
        });
        Ok(())
    }

    /// Route a cancel request to its in-flight execution.
    ///
    /// Absent keys - already finished, never started, or running elsewhere -
    /// are a silent no-op.
    pub fn cancel(&self, query_id: QueryId, message_id: MessageId) {
        let Ok(inflight) = self.inner.inflight.lock() else {
            tracing::warn!(%query_id, %message_id, "in-flight registry poisoned, dropping cancel");
            return;
        };
        match inflight.get(&(query_id, message_id)) {
            Some(token) => {
                tracing::debug!(%query_id, %message_id, "cancelling in-flight report execution");
                token.cancel();
            }
            None => {
                tracing::debug!(%query_id, %message_id, "cancel for unknown execution ignored");
            }
        }
    }

    /// Point lookup: is this key still executing?
    pub fn is_in_flight(&self, query_id: QueryId, message_id: MessageId) -> bool {
        self.inner
            .inflight
            .lock()
            .map(|inflight| inflight.contains_key(&(query_id, message_id)))
            .unwrap_or(false)
    }

    /// Number of executions currently in flight.
    pub fn active_count(&self) -> usize {
        self.inner
            .inflight
            .lock()
            .map(|inflight| inflight.len())
            .unwrap_or(0)
    }

    /// Stop accepting new queries and cancel every in-flight execution.
    ///
    /// Executions observe their child token at the next checkpoint and drain
    /// through the normal finish path, each still reporting its single
    /// completion.
    pub fn shutdown(&self) {
        tracing::debug!("dispatcher shutting down, cancelling in-flight executions");
        self.inner.shutdown.cancel();
    }
}

impl DispatcherInner {
    /// The only code path that removes a registry entry and reports the
    /// terminal completion.
    async fn finish(&self, query_id: QueryId, message_id: MessageId, outcome: Result<RunOutcome>) {
        // Remove before reporting: a cancel racing the natural finish must
        // see "absent" and never touch a token about to be reused for a
        // later execution of the same key.
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&(query_id, message_id));
        }

        let status = match outcome {
            Ok(RunOutcome::Completed { batches, rows }) => {
                tracing::debug!(%query_id, %message_id, batches, rows, "report execution completed");
                CompletionStatus::succeeded()
            }
            Ok(RunOutcome::Cancelled { batches }) => {
                tracing::debug!(%query_id, %message_id, batches, "report execution cancelled");
                CompletionStatus::succeeded()
            }
            Ok(RunOutcome::NotApplicable) => CompletionStatus::succeeded(),
            Err(ref e) if e.is_exchange_closed() => {
                // The caller already tore the exchange down; there is nobody
                // left to report to.
                tracing::debug!(%query_id, %message_id, "exchange closed mid-stream, dropping completion");
                return;
            }
            Err(e) => {
                tracing::warn!(%query_id, %message_id, error = %e, "report execution failed");
                CompletionStatus::failed(CompletionCode::from_error(&e), e.to_string())
            }
        };

        if let Err(e) = self.sender.send_completion(message_id, status).await {
            log_completion_error(message_id, &e);
        }
    }
}

fn log_completion_error(message_id: MessageId, err: &TransportError) {
    match err {
        TransportError::ExchangeClosed(_) => {
            tracing::debug!(%message_id, "completion raced an already-finished exchange");
        }
        other => {
            tracing::warn!(%message_id, error = %other, "failed to deliver completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelSender, OutboundMessage};
    use crate::types::{Row, TableSchema, TimeRange};
    use crate::BoxStream;
    use futures::{stream, StreamExt as _};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn report_type() -> ReportType {
        ReportType::new("counting")
    }

    /// Yields `count` numbered records, or blocks forever after `count` when
    /// `block_after` is set, ending only once cancellation fires.
    struct CountingProducer {
        count: usize,
        block_after: bool,
    }

    #[async_trait::async_trait]
    impl RecordProducer for CountingProducer {
        type Record = usize;

        async fn records(
            &self,
            _query: &ReportQuery,
            cancel: CancellationToken,
        ) -> crate::Result<BoxStream<'static, usize>> {
            let head = stream::iter((0..self.count).map(Ok));
            if self.block_after {
                let parked = stream::once(async move {
                    cancel.cancelled().await;
                    Err(Error::Cancelled)
                });
                Ok(Box::pin(head.chain(parked)))
            } else {
                Ok(Box::pin(head))
            }
        }

        fn schema(&self, _query: &ReportQuery) -> TableSchema {
            TableSchema::new(report_type(), ["n"])
        }

        fn fill_row(&self, record: &usize) -> crate::Result<Row> {
            let mut row = Row::with_capacity(1);
            row.push(*record as i64);
            Ok(row)
        }
    }

    /// Records materialize fine until `fail_at`, whose row errors out.
    struct BrittleProducer {
        count: usize,
        fail_at: usize,
    }

    #[async_trait::async_trait]
    impl RecordProducer for BrittleProducer {
        type Record = usize;

        async fn records(
            &self,
            _query: &ReportQuery,
            _cancel: CancellationToken,
        ) -> crate::Result<BoxStream<'static, usize>> {
            Ok(Box::pin(stream::iter((0..self.count).map(Ok))))
        }

        fn schema(&self, _query: &ReportQuery) -> TableSchema {
            TableSchema::new(report_type(), ["n"])
        }

        fn fill_row(&self, record: &usize) -> crate::Result<Row> {
            if *record == self.fail_at {
                return Err(Error::Materialize(format!(
                    "record {record} has no cell value"
                )));
            }
            let mut row = Row::with_capacity(1);
            row.push(*record as i64);
            Ok(row)
        }
    }

    fn dispatcher(
        producer: CountingProducer,
    ) -> (ReportDispatcher, mpsc::Receiver<OutboundMessage>) {
        let (sender, rx) = ChannelSender::new(32);
        let dispatcher = ReportDispatcher::builder()
            .register(report_type(), producer)
            .with_sender(Arc::new(sender))
            .with_config(DispatchConfig::new().with_default_window(3))
            .build()
            .unwrap();
        (dispatcher, rx)
    }

    fn query() -> ReportQuery {
        ReportQuery::new(report_type(), TimeRange::new(0, i64::MAX))
    }

    async fn recv(rx: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("sender dropped")
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected_then_restartable() {
        let (dispatcher, mut rx) = dispatcher(CountingProducer {
            count: 0,
            block_after: true,
        });
        let query = query();
        let message_id = MessageId::new();

        dispatcher
            .start(query.clone(), message_id, PartyId::new("p"))
            .unwrap();
        assert!(dispatcher.is_in_flight(query.id, message_id));

        let err = dispatcher
            .start(query.clone(), message_id, PartyId::new("p"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateExecution { .. }));

        // Finish the first execution, then the same key starts again.
        dispatcher.cancel(query.id, message_id);
        assert!(matches!(
            recv(&mut rx).await,
            OutboundMessage::Completion { status, .. } if status.success
        ));
        assert!(!dispatcher.is_in_flight(query.id, message_id));
        // The channel sender closes an exchange on completion, so the rerun
        // uses the same key only registry-side semantics here.
        assert_eq!(dispatcher.active_count(), 0);
        dispatcher
            .start(query, message_id, PartyId::new("p"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_unknown_key_is_noop() {
        let (dispatcher, _rx) = dispatcher(CountingProducer {
            count: 0,
            block_after: false,
        });
        dispatcher.cancel(QueryId::new(), MessageId::new());
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_report_type_completes_empty() {
        let (dispatcher, mut rx) = dispatcher(CountingProducer {
            count: 5,
            block_after: false,
        });
        let query = ReportQuery::new(ReportType::new("unknown_report"), TimeRange::new(0, 10));
        let query_id = query.id;
        let message_id = MessageId::new();

        dispatcher.start(query, message_id, PartyId::new("p")).unwrap();
        assert!(!dispatcher.is_in_flight(query_id, message_id));

        match recv(&mut rx).await {
            OutboundMessage::Completion { status, .. } => assert!(status.success),
            other => panic!("expected immediate completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_entry_removed_before_completion_is_reported() {
        let (dispatcher, mut rx) = dispatcher(CountingProducer {
            count: 4,
            block_after: false,
        });
        let query = query();
        let query_id = query.id;
        let message_id = MessageId::new();

        dispatcher.start(query, message_id, PartyId::new("p")).unwrap();

        // Drain partials until the completion arrives; by then the entry is
        // gone and a late cancel must be a no-op.
        loop {
            match recv(&mut rx).await {
                OutboundMessage::Partial { .. } => continue,
                OutboundMessage::Completion { status, .. } => {
                    assert!(status.success);
                    break;
                }
            }
        }
        assert!(!dispatcher.is_in_flight(query_id, message_id));
        dispatcher.cancel(query_id, message_id);
    }

    #[tokio::test]
    async fn test_row_fill_failure_reports_single_failure_completion() {
        let (sender, mut rx) = ChannelSender::new(32);
        let dispatcher = ReportDispatcher::builder()
            .register(
                report_type(),
                BrittleProducer {
                    count: 6,
                    fail_at: 4,
                },
            )
            .with_sender(Arc::new(sender))
            .with_config(DispatchConfig::new().with_default_window(3))
            .build()
            .unwrap();
        let query = query();
        let query_id = query.id;
        let message_id = MessageId::new();

        dispatcher.start(query, message_id, PartyId::new("p")).unwrap();

        // Window [0,1,2] goes out whole; record 4 aborts window [3,4,5].
        assert!(matches!(recv(&mut rx).await, OutboundMessage::Partial { .. }));
        match recv(&mut rx).await {
            OutboundMessage::Completion { status, .. } => {
                assert!(!status.success);
                assert_eq!(status.code, Some(CompletionCode::ReportError));
                assert!(status
                    .message
                    .as_deref()
                    .unwrap_or_default()
                    .contains("no cell value"));
            }
            other => panic!("expected failure completion, got {other:?}"),
        }
        assert!(!dispatcher.is_in_flight(query_id, message_id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exchange_closed_mid_stream_drops_completion() {
        let (sender, mut rx) = ChannelSender::new(32);
        let sender = Arc::new(sender);
        let dispatcher = ReportDispatcher::builder()
            .register(
                report_type(),
                CountingProducer {
                    count: 3,
                    block_after: false,
                },
            )
            .with_sender(sender.clone())
            .with_config(DispatchConfig::new().with_default_window(3))
            .build()
            .unwrap();
        let query = query();
        let query_id = query.id;
        let message_id = MessageId::new();
        sender.close_exchange(message_id);

        dispatcher.start(query, message_id, PartyId::new("p")).unwrap();

        // The first partial hits the closed exchange; the execution unwinds
        // without reporting a completion.
        timeout(Duration::from_secs(2), async {
            while dispatcher.is_in_flight(query_id, message_id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("execution did not unwind");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poisoned_registry_degrades_without_panicking() {
        let (dispatcher, _rx) = dispatcher(CountingProducer {
            count: 0,
            block_after: false,
        });
        let inner = Arc::clone(&dispatcher.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.inflight.lock().unwrap();
            panic!("poison the in-flight registry");
        })
        .join();

        let err = dispatcher
            .start(query(), MessageId::new(), PartyId::new("p"))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(dispatcher.active_count(), 0);
        assert!(!dispatcher.is_in_flight(QueryId::new(), MessageId::new()));
        dispatcher.cancel(QueryId::new(), MessageId::new());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_and_cancels_live() {
        let (dispatcher, mut rx) = dispatcher(CountingProducer {
            count: 0,
            block_after: true,
        });
        let query = query();
        let message_id = MessageId::new();
        dispatcher
            .start(query.clone(), message_id, PartyId::new("p"))
            .unwrap();

        dispatcher.shutdown();

        // Live execution drains through the finish path as a success.
        assert!(matches!(
            recv(&mut rx).await,
            OutboundMessage::Completion { status, .. } if status.success
        ));
        let err = dispatcher
            .start(query, MessageId::new(), PartyId::new("p"))
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }
}
