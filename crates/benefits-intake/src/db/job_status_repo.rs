//! Job status repository for the `job_statuses` table.
//!
//! One row per job id. `bgjob_errors` is a JSON object keyed by epoch
//! seconds; entries are only ever added.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Try,
    RetryableError,
    Success,
    Exhausted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Try => "try",
            JobState::RetryableError => "retryable_error",
            JobState::Success => "success",
            JobState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Exhausted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "try" => Ok(JobState::Try),
            "retryable_error" => Ok(JobState::RetryableError),
            "success" => Ok(JobState::Success),
            "exhausted" => Ok(JobState::Exhausted),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusRow {
    pub job_id: String,
    pub claim_id: String,
    pub status: String,
    pub retry_count: u32,
    pub bgjob_errors: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobStatusRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let raw_errors: String = row.get("bgjob_errors")?;
        let bgjob_errors = serde_json::from_str(&raw_errors).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        Ok(Self {
            job_id: row.get("job_id")?,
            claim_id: row.get("claim_id")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            bgjob_errors,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn state(&self) -> Option<JobState> {
        self.status.parse().ok()
    }
}

/// Creates or updates the status of a job in one statement.
pub fn upsert(
    db: &Database,
    job_id: &str,
    claim_id: &str,
    state: JobState,
    retry_count: u32,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_statuses (job_id, claim_id, status, retry_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(job_id) DO UPDATE SET
                status = excluded.status,
                retry_count = excluded.retry_count,
                updated_at = excluded.updated_at",
            params![job_id, claim_id, state.as_str(), retry_count, now],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, job_id: &str) -> Result<Option<JobStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM job_statuses WHERE job_id = ?1",
                params![job_id],
                JobStatusRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn find_by_claim(db: &Database, claim_id: &str) -> Result<Vec<JobStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_statuses WHERE claim_id = ?1 ORDER BY created_at")?;
        let rows = stmt
            .query_map(params![claim_id], JobStatusRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Adds `entry` to `bgjob_errors` under the epoch second of `at` and sets
/// the status in one transaction. If that second is already taken the next
/// free one is used, so earlier entries are never overwritten.
///
/// Returns the key the entry was stored under.
pub fn append_error(
    db: &Database,
    job_id: &str,
    state: JobState,
    at: DateTime<Utc>,
    entry: Value,
) -> Result<String, DatabaseError> {
    db.with_tx(|tx| {
        let raw: Option<String> = tx
            .query_row(
                "SELECT bgjob_errors FROM job_statuses WHERE job_id = ?1",
                params![job_id],
                |r| r.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| DatabaseError::NotFound {
            table: "job_statuses",
            key: job_id.to_string(),
        })?;

        let mut errors: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|e| DatabaseError::Json {
                column: "bgjob_errors",
                source: e,
            })?;

        let mut second = at.timestamp();
        while errors.contains_key(&second.to_string()) {
            second += 1;
        }
        let key = second.to_string();
        errors.insert(key.clone(), entry);

        let serialized = serde_json::to_string(&errors).map_err(|e| DatabaseError::Json {
            column: "bgjob_errors",
            source: e,
        })?;
        tx.execute(
            "UPDATE job_statuses SET bgjob_errors = ?2, status = ?3, updated_at = ?4
             WHERE job_id = ?1",
            params![job_id, serialized, state.as_str(), now_timestamp()],
        )?;

        Ok(key)
    })
}
