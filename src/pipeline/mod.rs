//! 流水线处理模块：惰性记录生产、定长分批与逐批物化的核心执行引擎。
//!
//! # Pipeline Module
//!
//! This module implements the per-execution processing pipeline: a pluggable
//! record producer feeds the batching combinator, each window is materialized
//! into a tabular batch, and each batch is emitted through the result sender.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Query → Records → Windows → TableBatch → send_partial
//!   │        │         │          │
//!   │     producer   Batched   fill_row per
//! validate  (lazy,   (≤ N      record, schema
//!           paged)   items)    fixed per type
//! ```
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RecordProducer`] | Per-report-type lazy record source + row mapping |
//! | [`batch::Batched`] | Fixed-size window combinator with cancellation checks |
//! | [`handler::TypedReportHandler`] | Generic produce→batch→materialize→emit driver |
//! | [`handler::ReportHandler`] | Type-erased seam stored by the dispatcher |
//!
//! Within one execution, the stages are strictly sequential: no two batches
//! of the same query are ever materialized or emitted concurrently, which is
//! what preserves row order in the caller-visible stream.

pub mod batch;
pub mod handler;


use crate::types::{ReportQuery, Row, TableSchema};
use crate::BoxStream;
use tokio_util::sync::CancellationToken;

/// Per-report-type record source and row mapping.
///
/// Producers are expected to do their own I/O lazily (paged fetches, cursor
/// walks) - they must not materialize the full result set eagerly. A producer
/// signals exhaustion by ending the stream and may end it early after
/// observing `cancel`; the batching combinator watches the same token, so
/// producers that ignore it still cancel at record granularity.
#[async_trait::async_trait]
pub trait RecordProducer: Send + Sync {
    type Record: Send + 'static;

    /// Lazy, ordered stream of records satisfying `query`. May be empty.
    async fn records(
        &self,
        query: &ReportQuery,
        cancel: CancellationToken,
    ) -> crate::Result<BoxStream<'static, Self::Record>>;

    /// Column set for this report type. Fixed per producer; every batch of
    /// one execution references the same schema.
    fn schema(&self, query: &ReportQuery) -> TableSchema;

    /// Pure mapping from one record to one row. No I/O, no side effects
    /// beyond building the row.
    fn fill_row(&self, record: &Self::Record) -> crate::Result<Row>;

    /// Handler-specific applicability predicate. A rejected query completes
    /// as an empty success ("nothing to report"), not an error.
    fn is_supported(&self, _query: &ReportQuery) -> bool {
        true
    }

    /// Preferred batch window; `None` defers to the dispatcher's
    /// configuration.
    fn window(&self) -> Option<usize> {
        None
    }
}
