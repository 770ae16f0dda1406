//! Concrete report types served by the pipeline.
//!
//! Each submodule supplies one [`RecordProducer`](crate::RecordProducer)
//! implementation plus its record and backing-store types. The set here is
//! deliberately small - hosts register their own producers the same way.
//!
//! | Module | Report type | Description |
//! |--------|-------------|-------------|
//! | [`activity`] | `activity_log` | Access-control events, fetched page by page |
//! | [`audit`] | `audit_trail` | Operator actions from an audit snapshot |

pub mod activity;
pub mod audit;

pub use activity::{ActivityLogProducer, ActivityRecord, ActivityStore, InMemoryActivityStore};
pub use audit::{AuditRecord, AuditTrailProducer};
