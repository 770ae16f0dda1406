//! 类型系统模块：查询标识、报表查询与表格化结果的核心数据类型。
//!
//! # Types Module
//!
//! Core data model of the report pipeline: query and exchange identifiers,
//! the report-type-tagged query object, and the materialized tabular results
//! that partial-batch sends carry.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`QueryId`] / [`MessageId`] | Stable query identity and per-exchange identity |
//! | [`QueryKey`] | `(QueryId, MessageId)` - at most one in-flight execution per key |
//! | [`ReportQuery`] | Report-type-tagged request with filter parameters |
//! | [`TableSchema`] | Fixed column set of one report type |
//! | [`TableBatch`] | One bounded window of materialized rows |

pub mod query;
pub mod table;

pub use query::{MessageId, PartyId, QueryId, QueryKey, ReportQuery, ReportType, TimeRange};
pub use table::{CellValue, Row, TableBatch, TableSchema};
