//! Claim store backed by `saved_claims` and `persistent_attachments`.

use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension, Row};

use super::{now_timestamp, Database, DatabaseError};
use crate::claim::{copy_to_scratch, Attachment, Claim, ClaimSource, Confirmation};
use crate::error::ClaimError;
use crate::storage::ScratchDir;

/// A claim row plus the stored location of its base PDF.
#[derive(Debug, Clone)]
pub struct StoredClaim {
    pub claim: Claim,
    pub pdf_path: PathBuf,
    pub status: String,
    pub tracking_id: Option<String>,
}

struct ClaimRow {
    id: String,
    guid: String,
    form_id: String,
    claim_type: String,
    business_line: String,
    form: String,
    pdf_path: String,
    submitted_claim_id: Option<String>,
    status: String,
    tracking_id: Option<String>,
}

impl ClaimRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            guid: row.get("guid")?,
            form_id: row.get("form_id")?,
            claim_type: row.get("claim_type")?,
            business_line: row.get("business_line")?,
            form: row.get("form")?,
            pdf_path: row.get("pdf_path")?,
            submitted_claim_id: row.get("submitted_claim_id")?,
            status: row.get("status")?,
            tracking_id: row.get("tracking_id")?,
        })
    }
}

/// Inserts a claim and its attachments.
pub fn insert(db: &Database, claim: &Claim, pdf_path: &Path) -> Result<(), DatabaseError> {
    let form = serde_json::to_string(&claim.form).map_err(|e| DatabaseError::Json {
        column: "form",
        source: e,
    })?;
    let now = now_timestamp();

    db.with_tx(|tx| {
        tx.execute(
            "INSERT INTO saved_claims (id, guid, form_id, claim_type, business_line, form,
             pdf_path, submitted_claim_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                claim.id,
                claim.guid,
                claim.form_id,
                claim.claim_type,
                claim.business_line,
                form,
                pdf_path.to_string_lossy(),
                claim.submitted_claim_id,
                now,
            ],
        )?;
        for (position, attachment) in claim.attachments.iter().enumerate() {
            tx.execute(
                "INSERT INTO persistent_attachments (id, saved_claim_id, file_path, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    attachment.id,
                    claim.id,
                    attachment.file_path.to_string_lossy(),
                    position as i64,
                    now,
                ],
            )?;
        }
        Ok(())
    })
}

pub fn find(db: &Database, claim_id: &str) -> Result<Option<StoredClaim>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM saved_claims WHERE id = ?1",
                params![claim_id],
                ClaimRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, file_path FROM persistent_attachments
             WHERE saved_claim_id = ?1 ORDER BY position",
        )?;
        let attachments = stmt
            .query_map(params![claim_id], |r| {
                Ok(Attachment {
                    id: r.get(0)?,
                    file_path: PathBuf::from(r.get::<_, String>(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let form = serde_json::from_str(&row.form).map_err(|e| DatabaseError::Json {
            column: "form",
            source: e,
        })?;

        Ok(Some(StoredClaim {
            claim: Claim {
                id: row.id,
                guid: row.guid,
                form_id: row.form_id,
                claim_type: row.claim_type,
                business_line: row.business_line,
                form,
                attachments,
                submitted_claim_id: row.submitted_claim_id,
            },
            pdf_path: PathBuf::from(row.pdf_path),
            status: row.status,
            tracking_id: row.tracking_id,
        }))
    })
}

pub fn mark_submitted(
    db: &Database,
    claim_id: &str,
    confirmation: &Confirmation,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE saved_claims SET status = 'submitted', tracking_id = ?2,
             upload_provider = ?3, submitted_at = ?4, updated_at = ?4
             WHERE id = ?1",
            params![claim_id, confirmation.tracking_id, confirmation.provider, now],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "saved_claims",
                key: claim_id.to_string(),
            });
        }
        Ok(())
    })
}

fn store_error(e: DatabaseError) -> ClaimError {
    ClaimError::Store(e.to_string())
}

impl ClaimSource for Database {
    fn find(&self, claim_id: &str) -> Result<Option<Claim>, ClaimError> {
        Ok(find(self, claim_id).map_err(store_error)?.map(|s| s.claim))
    }

    fn render(&self, claim: &Claim, scratch: &ScratchDir) -> Result<PathBuf, ClaimError> {
        let stored = find(self, &claim.id)
            .map_err(store_error)?
            .ok_or_else(|| ClaimError::Render {
                claim_id: claim.id.clone(),
                reason: "claim disappeared from the store".to_string(),
            })?;
        copy_to_scratch(&claim.id, &stored.pdf_path, scratch)
    }

    fn render_attachment(
        &self,
        claim: &Claim,
        attachment: &Attachment,
        scratch: &ScratchDir,
    ) -> Result<PathBuf, ClaimError> {
        copy_to_scratch(&claim.id, &attachment.file_path, scratch)
    }

    fn mark_submitted(
        &self,
        claim_id: &str,
        confirmation: &Confirmation,
    ) -> Result<(), ClaimError> {
        mark_submitted(self, claim_id, confirmation).map_err(store_error)
    }
}
