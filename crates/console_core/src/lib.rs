use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Report, ReportId, ReportPatch, ReportStatus},
    error::StoreError,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod review;

pub use review::{transition, ReviewAction};

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn list_reports(&self) -> Result<Vec<Report>, StoreError>;
    async fn update_report(&self, id: ReportId, patch: ReportPatch) -> Result<(), StoreError>;
}

pub struct MissingReportStore;

#[async_trait]
impl ReportStore for MissingReportStore {
    async fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        Err(StoreError::Unavailable(
            "report store not configured".to_string(),
        ))
    }

    async fn update_report(&self, id: ReportId, _patch: ReportPatch) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(format!(
            "report store not configured; cannot update report {id}"
        )))
    }
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("no report selected")]
    NoSelection,
    #[error("no edit in progress")]
    NotEditing,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An operator request, as produced by a front end. `ChangeStatus` with
/// `ReviewAction::SubmitEdit` routes through the draft submission path so
/// the pending edit is persisted with the status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleIntent {
    Refresh,
    Select(ReportId),
    ToggleEdit,
    EditDraft(String),
    SubmitEdit,
    ChangeStatus { id: ReportId, action: ReviewAction },
}

/// Immutable view of the console handed to a renderer. `reports` preserves
/// store order, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSnapshot {
    pub reports: Vec<Report>,
    pub selected_id: Option<ReportId>,
    pub draft: Option<String>,
}

impl ConsoleSnapshot {
    pub fn selected_report(&self) -> Option<&Report> {
        let id = self.selected_id?;
        self.reports.iter().find(|report| report.id == id)
    }

    pub fn is_editing(&self) -> bool {
        self.draft.is_some()
    }

    /// Content the detail pane should show for the selection: the open
    /// draft while editing, the committed content otherwise.
    pub fn display_content(&self) -> Option<&str> {
        let report = self.selected_report()?;
        Some(self.draft.as_deref().unwrap_or(&report.content))
    }
}

struct ConsoleState {
    reports: Vec<Report>,
    selected: Option<ReportId>,
    draft: Option<String>,
    has_loaded: bool,
    next_refresh_seq: u64,
    applied_refresh_seq: u64,
}

/// Review console state machine over an injected [`ReportStore`]. All
/// mutation goes through the intent methods; renderers read via
/// [`ReviewConsole::snapshot`]. The store lock is never held across a
/// store call, so a slow backend cannot wedge the console.
pub struct ReviewConsole {
    store: Arc<dyn ReportStore>,
    inner: Mutex<ConsoleState>,
}

impl ReviewConsole {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(ConsoleState {
                reports: Vec::new(),
                selected: None,
                draft: None,
                has_loaded: false,
                next_refresh_seq: 0,
                applied_refresh_seq: 0,
            }),
        }
    }

    /// Console wired to a store that fails every call. Useful as the
    /// default until a real adapter is available.
    pub fn unconfigured() -> Self {
        Self::new(Arc::new(MissingReportStore))
    }

    pub async fn snapshot(&self) -> ConsoleSnapshot {
        let state = self.inner.lock().await;
        ConsoleSnapshot {
            reports: state.reports.clone(),
            selected_id: state.selected,
            draft: state.draft.clone(),
        }
    }

    pub async fn apply(&self, intent: ConsoleIntent) -> Result<(), ConsoleError> {
        match intent {
            ConsoleIntent::Refresh => self.refresh().await,
            ConsoleIntent::Select(id) => {
                self.select(id).await;
                Ok(())
            }
            ConsoleIntent::ToggleEdit => {
                let editing = self.inner.lock().await.draft.is_some();
                if editing {
                    self.cancel_edit().await;
                    Ok(())
                } else {
                    self.enter_edit().await
                }
            }
            ConsoleIntent::EditDraft(text) => self.edit_draft(text).await,
            ConsoleIntent::SubmitEdit => self.submit_edit().await,
            ConsoleIntent::ChangeStatus { id, action } => match action {
                ReviewAction::SubmitEdit => self.submit_edit().await,
                _ => {
                    let current = {
                        let state = self.inner.lock().await;
                        state
                            .reports
                            .iter()
                            .find(|report| report.id == id)
                            .map(|report| report.status)
                    };
                    // Targets do not depend on the current status, so a
                    // report missing from the cache counts as pending.
                    let next = review::transition(current.unwrap_or(ReportStatus::Pending), action);
                    self.change_status(id, next).await
                }
            },
        }
    }

    /// Reloads the collection from the store and replaces the cache
    /// wholesale. Completions are sequence-numbered at dispatch; a result
    /// that arrives after a newer refresh has already applied is dropped.
    /// On failure the previous cache and selection are left untouched.
    pub async fn refresh(&self) -> Result<(), ConsoleError> {
        let seq = {
            let mut state = self.inner.lock().await;
            state.next_refresh_seq += 1;
            state.next_refresh_seq
        };

        let reports = match self.store.list_reports().await {
            Ok(reports) => reports,
            Err(err) => {
                warn!(seq, "review: refresh failed: {err}");
                return Err(err.into());
            }
        };

        let mut state = self.inner.lock().await;
        if seq <= state.applied_refresh_seq {
            debug!(
                seq,
                applied = state.applied_refresh_seq,
                "review: dropping stale refresh result"
            );
            return Ok(());
        }
        state.applied_refresh_seq = seq;
        apply_reports(&mut state, reports);
        Ok(())
    }

    /// Selects a report by id. Selecting the already-selected report is a
    /// no-op; any other change discards an open draft. An id not present
    /// in the cache clears the selection.
    pub async fn select(&self, id: ReportId) {
        let mut state = self.inner.lock().await;
        if state.selected == Some(id) {
            return;
        }
        let next = state
            .reports
            .iter()
            .any(|report| report.id == id)
            .then_some(id);
        if next.is_none() {
            debug!(report_id = id.0, "review: selected report is not in the collection");
        }
        if state.draft.take().is_some() {
            info!("review: selection changed; draft discarded");
        }
        state.selected = next;
    }

    /// Starts an edit of the selected report, initializing the draft from
    /// its committed content. Calling this while a draft is already open
    /// re-initializes the draft.
    pub async fn enter_edit(&self) -> Result<(), ConsoleError> {
        let mut state = self.inner.lock().await;
        let content = match selected_report_in(&state) {
            Some(report) => report.content.clone(),
            None => return Err(ConsoleError::NoSelection),
        };
        state.draft = Some(content);
        Ok(())
    }

    pub async fn edit_draft(&self, text: impl Into<String>) -> Result<(), ConsoleError> {
        let mut state = self.inner.lock().await;
        if state.draft.is_none() {
            return Err(ConsoleError::NotEditing);
        }
        state.draft = Some(text.into());
        Ok(())
    }

    pub async fn cancel_edit(&self) {
        let mut state = self.inner.lock().await;
        if state.draft.take().is_some() {
            debug!("review: edit cancelled; draft discarded");
        }
    }

    /// Persists the open draft as a suggested edit: one write carrying the
    /// draft content and the `RevisionSuggested` status, then a refresh.
    /// The draft is kept if the write fails and cleared once it succeeds,
    /// even if the follow-up refresh fails.
    pub async fn submit_edit(&self) -> Result<(), ConsoleError> {
        let (id, patch) = {
            let state = self.inner.lock().await;
            let draft = match state.draft.clone() {
                Some(draft) => draft,
                None => return Err(ConsoleError::NotEditing),
            };
            let report = match selected_report_in(&state) {
                Some(report) => report,
                None => return Err(ConsoleError::NoSelection),
            };
            let next = review::transition(report.status, ReviewAction::SubmitEdit);
            (
                report.id,
                ReportPatch {
                    content: Some(draft),
                    status: Some(next),
                },
            )
        };

        if let Err(err) = self.store.update_report(id, patch).await {
            warn!(report_id = id.0, "review: edit submission failed, draft kept: {err}");
            return Err(err.into());
        }
        info!(report_id = id.0, "review: edit suggestion submitted");

        {
            let mut state = self.inner.lock().await;
            state.draft = None;
        }
        self.refresh().await
    }

    /// Writes a status-only patch for the given report and refreshes. The
    /// committed content and any open draft are left alone, so a status
    /// change never interferes with an edit in progress.
    pub async fn change_status(
        &self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<(), ConsoleError> {
        let patch = ReportPatch {
            content: None,
            status: Some(status),
        };
        self.store.update_report(id, patch).await?;
        info!(report_id = id.0, status = %status, "review: status changed");
        self.refresh().await
    }
}

fn selected_report_in(state: &ConsoleState) -> Option<&Report> {
    let id = state.selected?;
    state.reports.iter().find(|report| report.id == id)
}

fn apply_reports(state: &mut ConsoleState, reports: Vec<Report>) {
    let first_load = !state.has_loaded;
    state.reports = reports;
    state.has_loaded = true;

    match state.selected {
        Some(id) if !state.reports.iter().any(|report| report.id == id) => {
            info!(
                report_id = id.0,
                "review: selected report left the collection; clearing selection"
            );
            state.selected = None;
            if state.draft.take().is_some() {
                warn!(report_id = id.0, "review: open draft discarded with its report");
            }
        }
        None if first_load => {
            state.selected = state.reports.first().map(|report| report.id);
            if let Some(id) = state.selected {
                debug!(report_id = id.0, "review: auto-selected newest report");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
