//! Activity log report: access-control events fetched page by page.

use crate::pipeline::RecordProducer;
use crate::types::{ReportQuery, ReportType, Row, TableSchema};
use crate::{BoxStream, Error};
use futures::stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default records fetched per backing-store page. Decoupled from the batch
/// window: one window may span several pages and vice versa.
pub const DEFAULT_PAGE_SIZE: usize = 250;

/// One access-control event from the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp_ms: i64,
    /// Cardholder or credential the event concerns.
    pub entity_id: String,
    /// Event kind, e.g. "AccessGranted", "AccessRefused".
    pub event_kind: String,
    /// Originating unit (door, reader, zone).
    pub source: String,
}

/// Paged, async source of activity records.
///
/// `offset`/`limit` index into the sequence of records matching the query,
/// in timestamp order. A short page signals exhaustion.
#[async_trait::async_trait]
pub trait ActivityStore: Send + Sync {
    async fn fetch_page(
        &self,
        query: &ReportQuery,
        offset: usize,
        limit: usize,
    ) -> crate::Result<Vec<ActivityRecord>>;
}

struct PageCursor {
    offset: usize,
    pending: VecDeque<ActivityRecord>,
    exhausted: bool,
}

/// Producer for the `activity_log` report type.
///
/// Fetches one page at a time from its [`ActivityStore`] and hands records
/// out one by one, so the pipeline never holds more than one page plus one
/// batch window in memory. Checks the cancellation token before each page
/// fetch.
pub struct ActivityLogProducer<S> {
    store: Arc<S>,
    page_size: usize,
}

/// Tag of the activity log report type.
pub fn report_type() -> ReportType {
    ReportType::new("activity_log")
}

impl<S> ActivityLogProducer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait::async_trait]
impl<S> RecordProducer for ActivityLogProducer<S>
where
    S: ActivityStore + 'static,
{
    type Record = ActivityRecord;

    async fn records(
        &self,
        query: &ReportQuery,
        cancel: CancellationToken,
    ) -> crate::Result<BoxStream<'static, ActivityRecord>> {
        let store = Arc::clone(&self.store);
        let page = query.page_size.unwrap_or(self.page_size).max(1);
        let query = query.clone();

        let cursor = PageCursor {
            offset: 0,
            pending: VecDeque::new(),
            exhausted: false,
        };
        let stream = stream::try_unfold(cursor, move |mut cursor| {
            let store = Arc::clone(&store);
            let query = query.clone();
            let cancel = cancel.clone();
            async move {
                loop {
                    if let Some(record) = cursor.pending.pop_front() {
                        return Ok(Some((record, cursor)));
                    }
                    // Ending the stream here is enough; the batching
                    // combinator turns the shared token into the
                    // cancellation outcome.
                    if cursor.exhausted || cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let fetched = store
                        .fetch_page(&query, cursor.offset, page)
                        .await
                        .map_err(|e| Error::Producer(e.to_string()))?;
                    cursor.exhausted = fetched.len() < page;
                    cursor.offset += fetched.len();
                    cursor.pending = fetched.into();
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn schema(&self, _query: &ReportQuery) -> TableSchema {
        TableSchema::new(
            report_type(),
            ["timestamp", "entity", "event", "source"],
        )
    }

    fn fill_row(&self, record: &ActivityRecord) -> crate::Result<Row> {
        let mut row = Row::with_capacity(4);
        row.push(crate::types::CellValue::Timestamp(record.timestamp_ms));
        row.push(record.entity_id.clone());
        row.push(record.event_kind.clone());
        row.push(record.source.clone());
        Ok(row)
    }
}

/// [`ActivityStore`] over an in-memory snapshot, for tests and embedding
/// hosts without a live event database.
#[derive(Default)]
pub struct InMemoryActivityStore {
    records: Vec<ActivityRecord>,
}

impl InMemoryActivityStore {
    pub fn with_records(mut records: Vec<ActivityRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp_ms);
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn fetch_page(
        &self,
        query: &ReportQuery,
        offset: usize,
        limit: usize,
    ) -> crate::Result<Vec<ActivityRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| query.range.contains(r.timestamp_ms) && query.matches_entity(&r.entity_id))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
