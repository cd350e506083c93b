//! The claim side of a submission: what the job reads from the claim store
//! and what it writes back once the intake service accepts the package.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClaimError;
use crate::storage::ScratchDir;

/// A stored supporting document belonging to a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub file_path: PathBuf,
}

/// A previously submitted claim. Immutable apart from its status fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub guid: String,
    pub form_id: String,
    /// Claim class, e.g. `SavedClaim::Pension`. Feeds the metadata source label.
    pub claim_type: String,
    pub business_line: String,
    pub form: Value,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Claim id in the legacy claims system, once one is assigned.
    #[serde(default)]
    pub submitted_claim_id: Option<String>,
}

impl Claim {
    pub fn form_field(&self, key: &str) -> Option<&Value> {
        self.form.get(key).filter(|v| !v.is_null())
    }
}

/// Written back to the claim when the intake service accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub tracking_id: String,
    pub provider: String,
}

/// Access to the external claim store.
pub trait ClaimSource: Send + Sync {
    fn find(&self, claim_id: &str) -> Result<Option<Claim>, ClaimError>;

    /// Produces the claim's base PDF as a fresh file in `scratch`. The caller
    /// owns (and deletes) the returned file.
    fn render(&self, claim: &Claim, scratch: &ScratchDir) -> Result<PathBuf, ClaimError>;

    /// Same as [`ClaimSource::render`] for one attachment.
    fn render_attachment(
        &self,
        claim: &Claim,
        attachment: &Attachment,
        scratch: &ScratchDir,
    ) -> Result<PathBuf, ClaimError>;

    fn mark_submitted(&self, claim_id: &str, confirmation: &Confirmation)
        -> Result<(), ClaimError>;
}

/// Optional side effect run after a successful upload (e.g. a confirmation
/// email). Failures are logged by the caller, never retried.
pub trait ConfirmationHook: Send + Sync {
    fn on_submitted(&self, claim: &Claim, confirmation: &Confirmation) -> Result<(), ClaimError>;
}

/// Copies a stored document into scratch so stamping never touches the
/// original.
pub fn copy_to_scratch(
    claim_id: &str,
    source: &Path,
    scratch: &ScratchDir,
) -> Result<PathBuf, ClaimError> {
    scratch.copy_in(source).map_err(|e| ClaimError::Render {
        claim_id: claim_id.to_string(),
        reason: e.to_string(),
    })
}
