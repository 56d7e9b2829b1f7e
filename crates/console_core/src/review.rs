use shared::domain::ReportStatus;

/// A reviewer decision about a report. `SubmitEdit` is the action recorded
/// when a content edit is suggested alongside the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewAction {
    Approve,
    RequestRevision,
    Reject,
    SubmitEdit,
}

/// Maps a review action to the status it produces. The workflow has no
/// terminal states and no guarded edges: every action is accepted from
/// every status, so a rejected report can still be approved later.
pub fn transition(current: ReportStatus, action: ReviewAction) -> ReportStatus {
    match (current, action) {
        (_, ReviewAction::Approve) => ReportStatus::Approved,
        (_, ReviewAction::RequestRevision) => ReportStatus::RevisionRequested,
        (_, ReviewAction::Reject) => ReportStatus::Rejected,
        (_, ReviewAction::SubmitEdit) => ReportStatus::RevisionSuggested,
    }
}
