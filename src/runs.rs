use crate::constants::RUNS_TABLE;
use crate::error::Result;
use crate::store::{quote_ident, Store};
use crate::table::{Table, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    /// Finished, but some inputs were skipped.
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

/// A job run record
#[derive(Debug, Clone, Serialize)]
pub struct EtlRun {
    pub id: Uuid,
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub detail: Option<String>,
}

impl EtlRun {
    pub fn new(job: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            detail: None,
        }
    }
}

fn timestamp(at: &DateTime<Utc>) -> Value {
    Value::Text(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Append-only ledger of job runs kept next to the data it describes.
pub struct RunRecorder;

impl RunRecorder {
    pub fn ensure_table<S: Store>(store: &S) -> Result<()> {
        store.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                run_id      TEXT PRIMARY KEY,
                job         TEXT NOT NULL,
                started_at  TEXT NOT NULL,
                finished_at TEXT,
                status      TEXT NOT NULL,
                detail      TEXT
            );
            "#,
            quote_ident(RUNS_TABLE)
        ))
    }

    /// Records the start of a job and returns its run handle.
    pub fn start<S: Store>(store: &S, job: &str) -> Result<EtlRun> {
        Self::ensure_table(store)?;
        let run = EtlRun::new(job);
        store.execute(
            &format!(
                "INSERT INTO {} (run_id, job, started_at, status) VALUES (?1, ?2, ?3, ?4)",
                quote_ident(RUNS_TABLE)
            ),
            &[
                Value::Text(run.id.to_string()),
                Value::Text(run.job.clone()),
                timestamp(&run.started_at),
                Value::Text(run.status.as_str().to_string()),
            ],
        )?;
        Ok(run)
    }

    pub fn finish<S: Store>(
        store: &S,
        run: &mut EtlRun,
        status: RunStatus,
        detail: Option<String>,
    ) -> Result<()> {
        let finished_at = Utc::now();
        store.execute(
            &format!(
                "UPDATE {} SET finished_at = ?1, status = ?2, detail = ?3 WHERE run_id = ?4",
                quote_ident(RUNS_TABLE)
            ),
            &[
                timestamp(&finished_at),
                Value::Text(status.as_str().to_string()),
                detail.clone().map(Value::Text).unwrap_or(Value::Null),
                Value::Text(run.id.to_string()),
            ],
        )?;
        run.finished_at = Some(finished_at);
        run.status = status;
        run.detail = detail;
        Ok(())
    }

    /// Most recent runs first.
    pub fn history<S: Store>(store: &S, limit: usize) -> Result<Table> {
        Self::ensure_table(store)?;
        store.query(&format!(
            "SELECT run_id, job, started_at, finished_at, status, detail FROM {} \
             ORDER BY started_at DESC, run_id LIMIT {}",
            quote_ident(RUNS_TABLE),
            limit
        ))
    }
}
