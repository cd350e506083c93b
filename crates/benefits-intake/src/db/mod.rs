//! Claim store and submission tracking in SQLite.
//!
//! Three groups of tables:
//! - `saved_claims` / `persistent_attachments`: the claim store read by the
//!   submission job ([`claim_repo`]).
//! - `form_submissions` / `form_submission_attempts`: one record per claim
//!   and one attempt per execution ([`submission_repo`]).
//! - `job_statuses`: scheduler-visible state and the `bgjob_errors` map
//!   ([`job_status_repo`]).
//!
//! Worker threads share one connection behind a mutex, so a repository call
//! never interleaves with another.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

pub mod claim_repo;
pub mod error;
pub mod job_status_repo;
pub mod migrations;
pub mod submission_repo;

pub use error::DatabaseError;
pub use job_status_repo::{JobState, JobStatusRow};
pub use submission_repo::{AttemptStatus, SubmissionAttemptRow, SubmissionRecordRow};

/// How long a statement waits on a lock held by another process (e.g. the
/// `status` command reading while `submit` runs).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the tracking database. Clones point at the same
/// connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the database file, creating its directory when
    /// missing, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn)?;

        log::info!("Tracking database ready at {}", path.display());
        Ok(db)
    }

    /// A private database that disappears with the handle.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::Poisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction that commits only if `f` succeeds.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::Poisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Current time in the format stored in every `*_at` column.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
