//! Generic produce → batch → materialize → emit driver.

use super::batch::Batched;
use super::RecordProducer;
use crate::transport::ResultSender;
use crate::types::{MessageId, PartyId, ReportQuery, ReportType, TableBatch};
use crate::Error;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How one pipeline run ended, before the dispatcher translates it into a
/// terminal completion. Failures travel as `Err` alongside this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Producer exhausted; every batch was emitted.
    Completed { batches: usize, rows: usize },
    /// Cancellation observed at a checkpoint. Batches already emitted stand.
    Cancelled { batches: usize },
    /// Wrong query type or the handler's predicate rejected it: nothing to
    /// report, which is a successful no-op rather than an error.
    NotApplicable,
}

/// Everything one execution needs, threaded in by the dispatcher.
pub struct ExecutionContext<'a> {
    pub query: &'a ReportQuery,
    pub message_id: MessageId,
    pub party: &'a PartyId,
    /// Resolved batch window for this execution.
    pub window: usize,
    pub sender: &'a dyn ResultSender,
    pub cancel: CancellationToken,
}

/// Type-erased handler seam. The dispatcher stores one per report type; the
/// record type lives behind [`TypedReportHandler`].
///
/// Implementations must never send the terminal completion themselves - they
/// return or fail, and the dispatcher reports exactly one completion.
#[async_trait::async_trait]
pub trait ReportHandler: Send + Sync {
    /// Tag this handler serves.
    fn report_type(&self) -> ReportType;

    /// Handler-preferred batch window, if it overrides the configuration.
    fn window(&self) -> Option<usize>;

    /// Drive the pipeline for one query to its end.
    async fn run(&self, ctx: ExecutionContext<'_>) -> crate::Result<RunOutcome>;
}

/// Wraps a [`RecordProducer`] into the generic pipeline drive loop.
pub struct TypedReportHandler<P> {
    report_type: ReportType,
    producer: P,
}

impl<P> TypedReportHandler<P> {
    pub fn new(report_type: ReportType, producer: P) -> Self {
        Self {
            report_type,
            producer,
        }
    }
}

#[async_trait::async_trait]
impl<P> ReportHandler for TypedReportHandler<P>
where
    P: RecordProducer,
{
    fn report_type(&self) -> ReportType {
        self.report_type.clone()
    }

    fn window(&self) -> Option<usize> {
        self.producer.window()
    }

    async fn run(&self, ctx: ExecutionContext<'_>) -> crate::Result<RunOutcome> {
        if ctx.query.report_type != self.report_type || !self.producer.is_supported(ctx.query) {
            tracing::debug!(
                query_id = %ctx.query.id,
                report_type = %ctx.query.report_type,
                "query not applicable to handler, completing as empty"
            );
            return Ok(RunOutcome::NotApplicable);
        }

        let records = self
            .producer
            .records(ctx.query, ctx.cancel.clone())
            .await?;
        let schema = Arc::new(self.producer.schema(ctx.query));

        let mut windows = Batched::new(records, ctx.window, ctx.cancel.clone());
        let mut batches = 0usize;
        let mut rows = 0usize;

        while let Some(next) = windows.next().await {
            let window = match next {
                Ok(window) => window,
                Err(Error::Cancelled) => {
                    tracing::debug!(
                        query_id = %ctx.query.id,
                        batches,
                        "cancellation observed, stopping batch production"
                    );
                    return Ok(RunOutcome::Cancelled { batches });
                }
                Err(e) => return Err(e),
            };

            let mut batch = TableBatch::new(Arc::clone(&schema), window.len());
            for record in &window {
                let row = self.producer.fill_row(record)?;
                batch.push_row(row)?;
            }
            rows += batch.len();

            // A failed send aborts the remaining batches; retries belong to
            // the transport collaborator, not this loop.
            ctx.sender
                .send_partial(ctx.message_id, batch, ctx.party, true, true)
                .await?;
            batches += 1;
        }

        Ok(RunOutcome::Completed { batches, rows })
    }
}
