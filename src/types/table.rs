//! Materialized tabular results.
//!
//! The wire format the host SDK uses for report data is out of scope here;
//! these types are the in-process shape a handler materializes one window of
//! records into before handing it to the result sender.

use crate::types::ReportType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One cell of a materialized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    /// Unix milliseconds.
    Timestamp(i64),
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

/// One materialized row; cell order follows the schema's column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: Vec<CellValue>,
}

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, cell: impl Into<CellValue>) {
        self.cells.push(cell.into());
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }
}

impl<const N: usize> From<[CellValue; N]> for Row {
    fn from(cells: [CellValue; N]) -> Self {
        Self {
            cells: cells.into(),
        }
    }
}

/// Column set of one report type. Fixed per report type; every batch of a
/// stream references the same schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub report_type: ReportType,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new<I, S>(report_type: ReportType, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            report_type,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// One bounded window of materialized rows, in production order.
///
/// Only the final batch of a stream may hold fewer rows than the window size.
#[derive(Debug, Clone)]
pub struct TableBatch {
    schema: Arc<TableSchema>,
    rows: Vec<Row>,
}

impl TableBatch {
    /// Empty batch shaped by the originating query's schema.
    pub fn new(schema: Arc<TableSchema>, capacity: usize) -> Self {
        Self {
            schema,
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Append one row, checking it against the schema's column count.
    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.schema.column_count() {
            return Err(Error::Materialize(format!(
                "row has {} cells, schema '{}' expects {}",
                row.len(),
                self.schema.report_type,
                self.schema.column_count()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
