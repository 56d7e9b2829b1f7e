use thiserror::Error;

use crate::domain::ReportId;

/// Failures surfaced by a report store. `Unavailable` covers connection
/// level faults; `Query` and `Write` carry the backend's own message for
/// the failing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("report store unavailable: {0}")]
    Unavailable(String),
    #[error("report query failed: {0}")]
    Query(String),
    #[error("report write failed: {0}")]
    Write(String),
    #[error("report {0} not found")]
    NotFound(ReportId),
}
