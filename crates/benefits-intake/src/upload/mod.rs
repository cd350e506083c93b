//! Upload providers: one contract, one implementation per backend.

pub mod benefits_intake;
pub mod factory;
pub mod legacy_claims;
pub mod transport;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::metadata::SubmissionMetadata;

pub use benefits_intake::BenefitsIntakeProvider;
pub use factory::ProviderFactory;
pub use legacy_claims::LegacyClaimsProvider;
pub use transport::{HttpTransport, TransportRequest, TransportResponse, UploadTransport};

/// An opened upload: the tracking id the backend will report status under
/// and where the package goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub tracking_id: String,
    pub location: String,
}

/// Backend-specific description of the document about to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub provider: String,
    pub tracking_id: String,
    pub location: String,
    pub file_name: String,
    /// Form id for the intake service, legacy document code for the claims
    /// system.
    pub document_type: String,
    /// Claim the legacy system files the document under.
    #[serde(default)]
    pub external_claim_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl UploadFile {
    /// Uses the final path component as the uploaded file name.
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        Self {
            path: path.to_path_buf(),
            file_name,
        }
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or(mime_guess::mime::APPLICATION_PDF)
            .to_string()
    }
}

/// Everything that goes out in one submission.
#[derive(Debug, Clone)]
pub struct UploadPackage {
    pub document: UploadFile,
    pub attachments: Vec<UploadFile>,
    pub metadata: SubmissionMetadata,
    /// Stable per claim; lets the backend drop duplicate uploads.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    pub tracking_id: String,
    pub status: u16,
    pub body: String,
}

/// One backend the package can be uploaded to.
pub trait UploadProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Obtains the tracking id before anything is sent, so it can be
    /// recorded first.
    fn open_session(&self) -> Result<UploadSession, UploadError>;

    fn generate_document(
        &self,
        session: &UploadSession,
        file_name: &str,
        document_type: &str,
    ) -> DocumentDescriptor;

    fn validate_document(&self, descriptor: &DocumentDescriptor) -> bool;

    /// Fails with [`UploadError::Rejected`] when the backend answers outside
    /// its accepted statuses.
    fn submit_document(
        &self,
        descriptor: &DocumentDescriptor,
        package: &UploadPackage,
    ) -> Result<UploadResult, UploadError>;
}

/// Turns a transport response into a result, or a rejection when `status`
/// is not accepted by the provider.
pub(crate) fn accept_response(
    provider: &'static str,
    accepted: &[u16],
    tracking_id: &str,
    response: TransportResponse,
) -> Result<UploadResult, UploadError> {
    if accepted.contains(&response.status) {
        Ok(UploadResult {
            success: true,
            tracking_id: tracking_id.to_string(),
            status: response.status,
            body: response.body,
        })
    } else {
        Err(UploadError::Rejected {
            provider,
            status: response.status,
            body: crate::sanitize::body_excerpt(&response.body),
        })
    }
}
