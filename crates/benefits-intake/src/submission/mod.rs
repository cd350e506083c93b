//! One submission execution: stamp the claim's documents, build metadata,
//! record the attempt and upload, plus the retry budget and the terminal
//! handler that runs when the budget is gone.

pub mod context;
pub mod exhaustion;
pub mod orchestrator;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use context::{SubmissionContext, SubmissionOutcome};
pub use exhaustion::{ExhaustedJob, ExhaustionHandler, EXHAUSTION_CALLER};
pub use orchestrator::SubmitClaimJob;
pub use retry::{Backoff, ExhaustReason, RetryDecision, RetryPolicy};

/// Progress of one execution.
///
/// `Pending → Rendering → BuildingMetadata → Uploading → Succeeded`, or any
/// step into `FailedTransient` (retried) or `FailedTerminal` (not retried).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    Rendering,
    BuildingMetadata,
    Uploading,
    Succeeded,
    FailedTransient,
    FailedTerminal,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::Rendering => "rendering",
            SubmissionState::BuildingMetadata => "building_metadata",
            SubmissionState::Uploading => "uploading",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::FailedTransient => "failed_transient",
            SubmissionState::FailedTerminal => "failed_terminal",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded
                | SubmissionState::FailedTransient
                | SubmissionState::FailedTerminal
        )
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
