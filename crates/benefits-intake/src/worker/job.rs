use crate::error::IntakeError;
use crate::submission::ExhaustReason;

/// One execution of the submission job for a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTask {
    pub job_id: String,
    pub claim_id: String,
    /// Retries already spent; 0 on the first execution.
    pub retry_count: u32,
}

impl SubmissionTask {
    /// A first execution under a fresh job id.
    pub fn new(claim_id: impl Into<String>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            claim_id: claim_id.into(),
            retry_count: 0,
        }
    }

    /// The same job, run again as retry number `retry_count`.
    pub fn retry(&self, retry_count: u32) -> Self {
        Self {
            job_id: self.job_id.clone(),
            claim_id: self.claim_id.clone(),
            retry_count,
        }
    }
}

/// Terminal result of a job: it either succeeded or will never run again.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub claim_id: String,
    pub success: bool,
    pub retry_count: u32,
    pub tracking_id: Option<String>,
    pub error: Option<String>,
    pub error_class: Option<String>,
    pub exhaust_reason: Option<ExhaustReason>,
    /// Set when the exhaustion entry could not be persisted, so the status
    /// row does not reflect the failure.
    pub exhaustion_error: Option<String>,
}

impl JobResult {
    pub fn success(task: &SubmissionTask, tracking_id: String) -> Self {
        Self {
            job_id: task.job_id.clone(),
            claim_id: task.claim_id.clone(),
            success: true,
            retry_count: task.retry_count,
            tracking_id: Some(tracking_id),
            error: None,
            error_class: None,
            exhaust_reason: None,
            exhaustion_error: None,
        }
    }

    pub fn exhausted(task: &SubmissionTask, error: &IntakeError, reason: ExhaustReason) -> Self {
        Self {
            job_id: task.job_id.clone(),
            claim_id: task.claim_id.clone(),
            success: false,
            retry_count: task.retry_count,
            tracking_id: None,
            error: Some(error.to_string()),
            error_class: Some(error.error_class().to_string()),
            exhaust_reason: Some(reason),
            exhaustion_error: None,
        }
    }

    /// Marks the exhaustion bookkeeping as failed.
    pub fn with_exhaustion_error(mut self, error: &IntakeError) -> Self {
        self.exhaustion_error = Some(error.to_string());
        self
    }
}
