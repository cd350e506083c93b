use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::error;

use crate::db::{job_status_repo, Database, JobState};
use crate::error::IntakeError;
use crate::stats::{StatKeys, StatsSink};

use super::ExhaustReason;

/// Recorded as `caller_method` in every exhaustion entry.
pub const EXHAUSTION_CALLER: &str = "SubmitClaimJob.retries_exhausted";

/// The final failure of a job, as seen by the exhaustion handler.
#[derive(Debug, Clone)]
pub struct ExhaustedJob<'a> {
    pub job_id: &'a str,
    pub claim_id: &'a str,
    pub retry_count: u32,
    pub error_class: &'a str,
    pub error_message: &'a str,
    pub reason: ExhaustReason,
}

/// Runs once per job when it will not be retried again.
pub struct ExhaustionHandler {
    db: Database,
    stats: Arc<dyn StatsSink>,
    keys: StatKeys,
}

impl ExhaustionHandler {
    pub fn new(db: Database, stats: Arc<dyn StatsSink>, keys: StatKeys) -> Self {
        Self { db, stats, keys }
    }

    pub fn handle(&self, job: &ExhaustedJob<'_>) -> Result<String, IntakeError> {
        self.handle_at(job, Utc::now())
    }

    /// Logs the failure, emits the exhaustion counter and adds an entry to
    /// the job's `bgjob_errors` while marking it exhausted. Returns the key
    /// the entry was stored under.
    ///
    /// A failure to persist is logged and returned; the job must not look
    /// cleanly finished when its status row was never written.
    pub fn handle_at(&self, job: &ExhaustedJob<'_>, at: DateTime<Utc>) -> Result<String, IntakeError> {
        error!(
            claim_id = %job.claim_id,
            job_id = %job.job_id,
            error_class = %job.error_class,
            reason = job.reason.as_str(),
            retry_count = job.retry_count,
            "Failed all retries on SubmitClaimJob, last error: {}",
            job.error_message
        );
        self.stats.increment(&self.keys.exhausted());

        let entry = json!({
            "caller_method": EXHAUSTION_CALLER,
            "error_class": job.error_class,
            "error_message": job.error_message,
            "timestamp": at.to_rfc3339(),
            "submission_id": job.claim_id,
            "retry_count": job.retry_count,
            "reason": job.reason.as_str(),
        });

        job_status_repo::append_error(&self.db, job.job_id, JobState::Exhausted, at, entry)
            .map_err(|e| {
                error!(
                    job_id = %job.job_id,
                    "Failure in {}: {}",
                    EXHAUSTION_CALLER,
                    e
                );
                IntakeError::from(e)
            })
    }
}
