//! Audit trail report: operator actions from an audit snapshot.

use crate::pipeline::RecordProducer;
use crate::types::{ReportQuery, ReportType, Row, TableSchema};
use crate::BoxStream;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tag of the audit trail report type.
pub fn report_type() -> ReportType {
    ReportType::new("audit_trail")
}

/// One entry from the audit trail: who changed what, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp_ms: i64,
    /// Operator that performed the action.
    pub actor: String,
    /// Action name, e.g. "EntityModified", "LoginFailed".
    pub action: String,
    /// Entity the action targeted.
    pub target: String,
}

/// Producer for the `audit_trail` report type.
///
/// Serves records out of a shared snapshot. Audit reads are point-in-time in
/// the original system, so a snapshot is the honest model; a paged store
/// would slot in the same way the activity producer's does.
///
/// Declines queries with an empty time window and prefers a smaller batch
/// window than the dispatcher default, since audit rows are wide.
pub struct AuditTrailProducer {
    entries: Arc<Vec<AuditRecord>>,
    window: usize,
}

impl AuditTrailProducer {
    pub fn new(mut entries: Vec<AuditRecord>) -> Self {
        entries.sort_by_key(|r| r.timestamp_ms);
        Self {
            entries: Arc::new(entries),
            window: 50,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }
}

#[async_trait::async_trait]
impl RecordProducer for AuditTrailProducer {
    type Record = AuditRecord;

    async fn records(
        &self,
        query: &ReportQuery,
        _cancel: CancellationToken,
    ) -> crate::Result<BoxStream<'static, AuditRecord>> {
        let entries = Arc::clone(&self.entries);
        let range = query.range;
        let filter = query.entity_filter.clone();
        let matches = move |record: &AuditRecord| {
            range.contains(record.timestamp_ms)
                && (filter.is_empty() || filter.iter().any(|e| *e == record.actor))
        };
        let snapshot: Vec<AuditRecord> = entries.iter().filter(|r| matches(r)).cloned().collect();
        Ok(Box::pin(stream::iter(snapshot.into_iter().map(Ok))))
    }

    fn schema(&self, _query: &ReportQuery) -> TableSchema {
        TableSchema::new(report_type(), ["timestamp", "actor", "action", "target"])
    }

    fn fill_row(&self, record: &AuditRecord) -> crate::Result<Row> {
        let mut row = Row::with_capacity(4);
        row.push(crate::types::CellValue::Timestamp(record.timestamp_ms));
        row.push(record.actor.clone());
        row.push(record.action.clone());
        row.push(record.target.clone());
        Ok(row)
    }

    fn is_supported(&self, query: &ReportQuery) -> bool {
        !query.range.is_empty()
    }

    fn window(&self) -> Option<usize> {
        Some(self.window)
    }
}
