use serde::Serialize;

use crate::error::IntakeError;
use crate::storage::TempFiles;

use super::SubmissionState;

/// Per-execution state carried through the orchestration steps.
pub struct SubmissionContext {
    // Input
    pub claim_id: String,
    pub job_id: String,

    pub state: SubmissionState,

    // Known once the claim is loaded
    pub form_id: Option<String>,

    // Known once an upload session is open
    pub tracking_id: Option<String>,
    pub attempt_id: Option<i64>,

    // Every scratch file produced by this execution
    pub temp_files: TempFiles,
}

impl SubmissionContext {
    pub fn new(claim_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            claim_id: claim_id.into(),
            job_id: job_id.into(),
            state: SubmissionState::Pending,
            form_id: None,
            tracking_id: None,
            attempt_id: None,
            temp_files: TempFiles::new(),
        }
    }

    /// Moves to the failure state matching `error`. Returns the state the
    /// execution failed in.
    pub fn fail(&mut self, error: &IntakeError) -> SubmissionState {
        let failed_during = self.state;
        self.state = if error.is_retryable() {
            SubmissionState::FailedTransient
        } else {
            SubmissionState::FailedTerminal
        };
        failed_during
    }
}

/// What a successful execution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub claim_id: String,
    pub job_id: String,
    pub tracking_id: String,
    pub provider: String,
    pub attempt_id: i64,
    /// Primary document plus attachments.
    pub documents: usize,
}
