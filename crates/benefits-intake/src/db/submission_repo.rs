//! Submission records and their attempts (`form_submissions`,
//! `form_submission_attempts`).

use std::fmt;

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Pending,
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per claim, written before the first upload.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecordRow {
    pub id: i64,
    pub form_type: String,
    pub form_data: String,
    pub benefits_intake_uuid: String,
    pub saved_claim_id: String,
    pub created_at: String,
}

impl SubmissionRecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            form_type: row.get("form_type")?,
            form_data: row.get("form_data")?,
            benefits_intake_uuid: row.get("benefits_intake_uuid")?,
            saved_claim_id: row.get("saved_claim_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// One row per job execution that reached the upload step.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionAttemptRow {
    pub id: i64,
    pub form_submission_id: i64,
    pub benefits_intake_uuid: String,
    pub job_id: String,
    pub upload_provider: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SubmissionAttemptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            form_submission_id: row.get("form_submission_id")?,
            benefits_intake_uuid: row.get("benefits_intake_uuid")?,
            job_id: row.get("job_id")?,
            upload_provider: row.get("upload_provider")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Returns the claim's submission record, creating it on first use. A
/// retry reuses the existing record unchanged.
pub fn find_or_create_record(
    db: &Database,
    saved_claim_id: &str,
    form_type: &str,
    form_data: &str,
    benefits_intake_uuid: &str,
) -> Result<SubmissionRecordRow, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO form_submissions
                (form_type, form_data, benefits_intake_uuid, saved_claim_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(saved_claim_id) DO NOTHING",
            params![
                form_type,
                form_data,
                benefits_intake_uuid,
                saved_claim_id,
                now_timestamp()
            ],
        )?;
        let row = conn.query_row(
            "SELECT * FROM form_submissions WHERE saved_claim_id = ?1",
            params![saved_claim_id],
            SubmissionRecordRow::from_row,
        )?;
        Ok(row)
    })
}

pub fn find_record_by_claim(
    db: &Database,
    saved_claim_id: &str,
) -> Result<Option<SubmissionRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM form_submissions WHERE saved_claim_id = ?1",
                params![saved_claim_id],
                SubmissionRecordRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Adds a pending attempt and returns its id.
pub fn create_attempt(
    db: &Database,
    form_submission_id: i64,
    benefits_intake_uuid: &str,
    job_id: &str,
    upload_provider: &str,
) -> Result<i64, DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO form_submission_attempts
                (form_submission_id, benefits_intake_uuid, job_id, upload_provider, status,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                form_submission_id,
                benefits_intake_uuid,
                job_id,
                upload_provider,
                AttemptStatus::Pending.as_str(),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn update_attempt_status(
    db: &Database,
    attempt_id: i64,
    status: AttemptStatus,
    error_message: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE form_submission_attempts SET status = ?2, error_message = ?3, updated_at = ?4
             WHERE id = ?1",
            params![attempt_id, status.as_str(), error_message, now_timestamp()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "form_submission_attempts",
                key: attempt_id.to_string(),
            });
        }
        Ok(())
    })
}

pub fn attempts_for_claim(
    db: &Database,
    saved_claim_id: &str,
) -> Result<Vec<SubmissionAttemptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.* FROM form_submission_attempts a
             JOIN form_submissions s ON s.id = a.form_submission_id
             WHERE s.saved_claim_id = ?1
             ORDER BY a.id",
        )?;
        let rows = stmt
            .query_map(params![saved_claim_id], SubmissionAttemptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
