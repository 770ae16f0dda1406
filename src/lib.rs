//! # report-stream
//!
//! 报表查询流水线：把一次查询变成惰性产出、分批发送、可协作取消的结果流。
//!
//! Streaming report-query pipeline - turns a query object into a
//! lazily-produced, batched, and cancellable stream of tabular result rows,
//! multiplexed across many concurrently in-flight queries.
//!
//! ## Overview
//!
//! A host (typically an SDK "report plugin") hands the [`ReportDispatcher`] an
//! inbound query tagged with a report type. The dispatcher looks up the
//! registered handler for that type and drives a fixed pipeline:
//!
//! ```text
//! Query → Producer → Batcher → Materialize → Emit
//!            │          │           │           │
//!         lazy paged  windows    schema-shaped  ResultSender
//!         record I/O  of ≤ N     TableBatch     (partial sends)
//! ```
//!
//! Each in-flight execution is keyed by `(QueryId, MessageId)` and owns a
//! [`CancellationToken`](tokio_util::sync::CancellationToken); cancellation is
//! cooperative, observed between records and between batches, and a terminal
//! completion is reported exactly once per execution no matter how it ends.
//!
//! ## Core Guarantees
//!
//! - **Order**: records and batches within one query preserve producer order.
//! - **Bounded memory**: at most one window of records is buffered per query.
//! - **Isolation**: queries run as independent tasks; one stalling query never
//!   blocks another.
//! - **Single completion**: success, cancellation, failure, and unsupported
//!   report types all funnel through one finish path in the dispatcher.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use report_stream::{MessageId, PartyId, ReportDispatcherBuilder, ReportQuery};
//! use report_stream::reports::activity::{self, ActivityLogProducer, InMemoryActivityStore};
//! use report_stream::transport::ChannelSender;
//! use report_stream::types::TimeRange;
//!
//! #[tokio::main]
//! async fn main() -> report_stream::Result<()> {
//!     let (sender, mut outbound) = ChannelSender::new(64);
//!     let store = Arc::new(InMemoryActivityStore::default());
//!
//!     let dispatcher = ReportDispatcherBuilder::new()
//!         .register(activity::report_type(), ActivityLogProducer::new(store))
//!         .with_sender(Arc::new(sender))
//!         .build()?;
//!
//!     let query = ReportQuery::new(activity::report_type(), TimeRange::new(0, i64::MAX));
//!     dispatcher.start(query, MessageId::new(), PartyId::new("console-1"))?;
//!
//!     while let Some(msg) = outbound.recv().await {
//!         // Forward partial batches / completion to the caller...
//!         let _ = msg;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Query, identifier, and tabular-result value types |
//! | [`pipeline`] | Producer/handler traits and the batching combinator |
//! | [`registry`] | In-flight query dispatch, cancellation, completion |
//! | [`transport`] | Outbound result-sender boundary and channel sender |
//! | [`reports`] | Concrete report types (activity log, audit trail) |
//! | [`config`] | Batch-window configuration consumed by the dispatcher |

pub mod config;
pub mod pipeline;
pub mod registry;
pub mod reports;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::DispatchConfig;
pub use pipeline::handler::{RunOutcome, TypedReportHandler};
pub use pipeline::RecordProducer;
pub use registry::{ReportDispatcher, ReportDispatcherBuilder};
pub use transport::{CompletionStatus, ResultSender, TransportError};
pub use types::{MessageId, PartyId, QueryId, ReportQuery, ReportType};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream of fallible items, as produced by record
/// producers and consumed by the batching combinator.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{CompletionCode, Error};
