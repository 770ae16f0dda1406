//! Query identity and the report-type-tagged request object.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of one logical query. Survives across request/response
/// exchanges for the same query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one request/response exchange. A new one is assigned per
/// exchange even when the same logical query runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of one in-flight execution. The dispatcher guarantees at
/// most one live execution per key at any time.
pub type QueryKey = (QueryId, MessageId);

/// Identifier of the party that asked for the report and receives the
/// partial batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifying which kind of structured result a query requests
/// (e.g. activity log, audit trail). Keys the handler lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportType(String);

impl ReportType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReportType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Half-open time window `[start_ms, end_ms)` in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms
    }

    pub fn is_empty(&self) -> bool {
        self.end_ms <= self.start_ms
    }
}

/// A report request as it arrives from the caller.
///
/// The pipeline treats everything past `id` and `report_type` as opaque
/// filter parameters for the producer: time window, entity filters, and an
/// optional page-size hint for producers that fetch in pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportQuery {
    pub id: QueryId,
    pub report_type: ReportType,
    pub range: TimeRange,
    /// Entity ids to restrict the report to; empty means "all entities".
    #[serde(default)]
    pub entity_filter: Vec<String>,
    /// Producer page-size hint; producers fall back to their own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

impl ReportQuery {
    pub fn new(report_type: ReportType, range: TimeRange) -> Self {
        Self {
            id: QueryId::new(),
            report_type,
            range,
            entity_filter: Vec::new(),
            page_size: None,
        }
    }

    pub fn with_id(mut self, id: QueryId) -> Self {
        self.id = id;
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_filter = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// True when `entity` passes the query's entity filter.
    pub fn matches_entity(&self, entity: &str) -> bool {
        self.entity_filter.is_empty() || self.entity_filter.iter().any(|e| e == entity)
    }
}
