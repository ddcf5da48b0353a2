//! SQLite job store
//!
//! Persists [`GenerationJob`] records so a job started by one process can be
//! polled by another (`archgen status <id>`).
//!
//! # Database Schema
//!
//! 1. **jobs** - one row per job; the result units are stored as a JSON array
//! 2. **schema_version** - schema version for migrations
//!
//! WAL mode is enabled so a poller can read while the driving task writes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use archgen_sdk::JobStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::jobs::{check_transition, JobStore};
use crate::pipeline::types::{GeneratedUnit, GenerationJob, JobKind};

const JOB_COLUMNS: &str = "id, kind, status, total_units, completed_units, current_unit_label, \
                           error, result, created_at, updated_at";

/// Job persistence backed by a single SQLite connection
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        tracing::debug!(
            path = %path.display(),
            schema_version = store.get_schema_version()?,
            "job database opened"
        );
        Ok(store)
    }

    /// In-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,

                -- Progress
                total_units INTEGER NOT NULL DEFAULT 0,
                completed_units INTEGER NOT NULL DEFAULT 0,
                current_unit_label TEXT,

                -- Outcome
                error TEXT,
                result TEXT,

                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at DESC);

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )?;
        Ok(())
    }

    pub fn get_schema_version(&self) -> Result<i32> {
        let version: i32 = self.lock().query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    pub fn insert_job(&self, job: &GenerationJob) -> Result<()> {
        let result = encode_result(&job.result)?;
        self.lock().execute(
            r#"
            INSERT INTO jobs (
                id, kind, status, total_units, completed_units, current_unit_label,
                error, result, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                job.id.to_string(),
                job.kind.as_str(),
                job.status.as_str(),
                job.total_units as i64,
                job.completed_units as i64,
                job.current_unit_label,
                job.error,
                result,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Overwrite a job row; returns false when no row matched
    pub fn update_job(&self, job: &GenerationJob) -> Result<bool> {
        let result = encode_result(&job.result)?;
        let changed = self.lock().execute(
            r#"
            UPDATE jobs
            SET status = ?1, total_units = ?2, completed_units = ?3, current_unit_label = ?4,
                error = ?5, result = ?6, updated_at = ?7
            WHERE id = ?8
            "#,
            params![
                job.status.as_str(),
                job.total_units as i64,
                job.completed_units as i64,
                job.current_unit_label,
                job.error,
                result,
                job.updated_at.to_rfc3339(),
                job.id.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_job(&self, id: &Uuid) -> Result<Option<GenerationJob>> {
        let job = self
            .lock()
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id.to_string()],
                map_job_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Most recent jobs first, optionally filtered by status
    pub fn list_jobs(&self, limit: usize, status: Option<JobStatus>) -> Result<Vec<GenerationJob>> {
        let conn = self.lock();
        let jobs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_str(), limit as i64], map_job_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?1",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit as i64], map_job_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(jobs)
    }

    /// Delete terminal jobs created before `cutoff`
    pub fn delete_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self.lock().execute(
            "DELETE FROM jobs WHERE created_at < ?1 AND status IN (?2, ?3)",
            params![
                cutoff.to_rfc3339(),
                JobStatus::Complete.as_str(),
                JobStatus::Error.as_str()
            ],
        )?;
        Ok(deleted)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: GenerationJob) -> Result<(), PipelineError> {
        self.insert_job(&job).map_err(store_error)
    }

    async fn update(&self, job: GenerationJob) -> Result<(), PipelineError> {
        let current = self
            .get_job(&job.id)
            .map_err(store_error)?
            .ok_or_else(|| PipelineError::Job(format!("job {} not found", job.id)))?;
        check_transition(&current, &job)?;
        self.update_job(&job).map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, PipelineError> {
        self.get_job(&id).map_err(store_error)
    }
}

fn store_error(e: anyhow::Error) -> PipelineError {
    PipelineError::Job(format!("{:#}", e))
}

fn encode_result(result: &Option<Vec<GeneratedUnit>>) -> Result<Option<String>> {
    result
        .as_ref()
        .map(|units| serde_json::to_string(units).map_err(|e| anyhow!("Failed to encode result: {}", e)))
        .transpose()
}

fn conversion_error(
    index: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_timestamp(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {field} value '{value}'")]
struct UnknownValue {
    field: &'static str,
    value: String,
}

/// Map a database row to GenerationJob
fn map_job_row(row: &Row) -> rusqlite::Result<GenerationJob> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let total_units: i64 = row.get(3)?;
    let completed_units: i64 = row.get(4)?;
    let current_unit_label: Option<String> = row.get(5)?;
    let error: Option<String> = row.get(6)?;
    let result_str: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;

    let kind = JobKind::parse(&kind_str).ok_or_else(|| {
        conversion_error(
            1,
            UnknownValue {
                field: "kind",
                value: kind_str.clone(),
            },
        )
    })?;

    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        conversion_error(
            2,
            UnknownValue {
                field: "status",
                value: status_str.clone(),
            },
        )
    })?;

    let result = result_str
        .map(|s| serde_json::from_str::<Vec<GeneratedUnit>>(&s))
        .transpose()
        .map_err(|e| conversion_error(7, e))?;

    Ok(GenerationJob {
        id,
        kind,
        status,
        total_units: total_units.max(0) as usize,
        completed_units: completed_units.max(0) as usize,
        current_unit_label,
        error,
        result,
        created_at: parse_timestamp(8, &created_at_str)?,
        updated_at: parse_timestamp(9, &updated_at_str)?,
    })
}
