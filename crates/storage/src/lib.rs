use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use console_core::ReportStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{Report, ReportId, ReportPatch, ReportStatus},
    error::StoreError,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_report(&self, title: &str, author: &str, content: &str) -> Result<ReportId> {
        self.insert_report(title, author, content, ReportStatus::Pending, Utc::now())
            .await
    }

    async fn insert_report(
        &self,
        title: &str,
        author: &str,
        content: &str,
        status: ReportStatus,
        created_at: DateTime<Utc>,
    ) -> Result<ReportId> {
        let rec = sqlx::query(
            "INSERT INTO reports (title, author, created_at, check_ins, content, status)
             VALUES (?, ?, ?, 0, ?, ?)
             RETURNING id",
        )
        .bind(title)
        .bind(author)
        .bind(created_at)
        .bind(content)
        .bind(status.label())
        .fetch_one(&self.pool)
        .await?;
        Ok(ReportId(rec.get::<i64, _>(0)))
    }

    pub async fn delete_report(&self, id: ReportId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bumps the check-in counter for a report and returns the new count.
    pub async fn record_check_in(&self, id: ReportId) -> Result<i64> {
        let row = sqlx::query(
            "UPDATE reports SET check_ins = check_ins + 1 WHERE id = ? RETURNING check_ins",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .with_context(|| format!("report {id} not found"))?;
        Ok(row.get::<i64, _>(0))
    }

    /// Inserts a batch of demo reports for local development. Only seeds an
    /// empty table; returns the number of reports inserted.
    pub async fn seed_demo_reports(&self) -> Result<usize> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 {
            return Ok(0);
        }

        let base = Utc::now();
        let demo: [(&str, &str, &str, ReportStatus, i64); 5] = [
            (
                "Shoreline cleanup, sector 4",
                "M. Okafor",
                "Collected 18 bags of debris along the south shoreline. Two tires \
                 pulled from the reed bed; flagged an oil sheen near the culvert \
                 for follow-up.",
                ReportStatus::Pending,
                45,
            ),
            (
                "North ridge reforestation survey",
                "L. Tran",
                "Sapling survival at 82% across plots A through D. Deer browsing \
                 damage concentrated in plot C; fencing recommended before fall.",
                ReportStatus::Pending,
                160,
            ),
            (
                "Creek water quality sampling",
                "A. Patel",
                "Dissolved oxygen and pH within seasonal norms at all three \
                 stations. Turbidity elevated downstream of the access road.",
                ReportStatus::RevisionRequested,
                320,
            ),
            (
                "Pollinator garden maintenance",
                "R. Chen",
                "Weeded and mulched both beds, replaced four milkweed plants. \
                 Monarch larvae observed on six plants.",
                ReportStatus::Approved,
                1510,
            ),
            (
                "Trailhead invasive species removal",
                "S. Ibarra",
                "Cleared garlic mustard from the first half mile of the loop \
                 trail. Remaining patches mapped for the next work day.",
                ReportStatus::Rejected,
                2890,
            ),
        ];

        for (title, author, content, status, minutes_old) in demo {
            self.insert_report(title, author, content, status, base - Duration::minutes(minutes_old))
                .await?;
        }
        Ok(demo.len())
    }
}

#[async_trait]
impl ReportStore for Storage {
    async fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, author, created_at, check_ins, content, status
             FROM reports
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(report_from_row).collect()
    }

    async fn update_report(&self, id: ReportId, patch: ReportPatch) -> Result<(), StoreError> {
        let result = match (patch.content, patch.status) {
            (Some(content), Some(status)) => {
                sqlx::query("UPDATE reports SET content = ?, status = ? WHERE id = ?")
                    .bind(content)
                    .bind(status.label())
                    .bind(id.0)
                    .execute(&self.pool)
                    .await
            }
            (Some(content), None) => {
                sqlx::query("UPDATE reports SET content = ? WHERE id = ?")
                    .bind(content)
                    .bind(id.0)
                    .execute(&self.pool)
                    .await
            }
            (None, Some(status)) => {
                sqlx::query("UPDATE reports SET status = ? WHERE id = ?")
                    .bind(status.label())
                    .bind(id.0)
                    .execute(&self.pool)
                    .await
            }
            (None, None) => {
                return Err(StoreError::Write("empty report patch".to_string()));
            }
        };

        let result = result.map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn report_from_row(row: SqliteRow) -> Result<Report, StoreError> {
    let status_label: String = row.get(6);
    let status = ReportStatus::from_label(&status_label)
        .ok_or_else(|| StoreError::Query(format!("unrecognized report status '{status_label}'")))?;
    Ok(Report {
        id: ReportId(row.get::<i64, _>(0)),
        title: row.get::<String, _>(1),
        author: row.get::<String, _>(2),
        created_at: row.get::<DateTime<Utc>, _>(3),
        check_ins: row.get::<i64, _>(4),
        content: row.get::<String, _>(5),
        status,
    })
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
    )
}

fn query_error(err: sqlx::Error) -> StoreError {
    if is_connection_error(&err) {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Query(err.to_string())
    }
}

fn write_error(err: sqlx::Error) -> StoreError {
    if is_connection_error(&err) {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Write(err.to_string())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
