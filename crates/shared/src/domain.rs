use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportId(pub i64);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review status of a field report. `Display` renders the human label used
/// in the status column, which is also the persisted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    RevisionSuggested,
    RevisionRequested,
    Rejected,
}

impl ReportStatus {
    pub fn label(self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Approved => "Approved",
            ReportStatus::RevisionSuggested => "Revision Suggested",
            ReportStatus::RevisionRequested => "Revision Requested",
            ReportStatus::Rejected => "Rejected",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Pending" => Some(ReportStatus::Pending),
            "Approved" => Some(ReportStatus::Approved),
            "Revision Suggested" => Some(ReportStatus::RevisionSuggested),
            "Revision Requested" => Some(ReportStatus::RevisionRequested),
            "Rejected" => Some(ReportStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub check_ins: i64,
    pub content: String,
    pub status: ReportStatus,
}

/// Partial update for a report. Absent fields are left untouched by the
/// store; a patch with neither field set is rejected as a write error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}
