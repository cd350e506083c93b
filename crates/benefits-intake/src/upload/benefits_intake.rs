use std::sync::Arc;

use tracing::info;

use super::{
    accept_response, DocumentDescriptor, TransportRequest, UploadPackage, UploadProvider,
    UploadResult, UploadSession, UploadTransport,
};
use crate::error::UploadError;

const PROVIDER_NAME: &str = "benefits_intake";
const ACCEPTED_STATUSES: &[u16] = &[200];

/// Document intake service: the whole package (primary document, metadata
/// and attachments) goes up in one multipart request to the session
/// location.
pub struct BenefitsIntakeProvider {
    transport: Arc<dyn UploadTransport>,
}

impl BenefitsIntakeProvider {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }
}

impl UploadProvider for BenefitsIntakeProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn open_session(&self) -> Result<UploadSession, UploadError> {
        self.transport.open_session()
    }

    fn generate_document(
        &self,
        session: &UploadSession,
        file_name: &str,
        document_type: &str,
    ) -> DocumentDescriptor {
        DocumentDescriptor {
            provider: PROVIDER_NAME.to_string(),
            tracking_id: session.tracking_id.clone(),
            location: session.location.clone(),
            file_name: file_name.to_string(),
            document_type: document_type.to_string(),
            external_claim_id: None,
        }
    }

    fn validate_document(&self, descriptor: &DocumentDescriptor) -> bool {
        !descriptor.tracking_id.is_empty()
            && !descriptor.location.is_empty()
            && !descriptor.file_name.is_empty()
            && !descriptor.document_type.is_empty()
    }

    fn submit_document(
        &self,
        descriptor: &DocumentDescriptor,
        package: &UploadPackage,
    ) -> Result<UploadResult, UploadError> {
        if !self.validate_document(descriptor) {
            return Err(UploadError::InvalidDocument {
                provider: PROVIDER_NAME,
                reason: "descriptor is missing tracking id, location, file name or type"
                    .to_string(),
            });
        }

        let metadata_json = package
            .metadata
            .to_json()
            .map_err(|e| UploadError::InvalidDocument {
                provider: PROVIDER_NAME,
                reason: format!("metadata is not serializable: {}", e),
            })?;

        let response = self.transport.upload(&TransportRequest {
            location: &descriptor.location,
            file: &package.document,
            metadata_json: &metadata_json,
            attachments: &package.attachments,
            idempotency_key: &package.idempotency_key,
        })?;

        let result = accept_response(
            PROVIDER_NAME,
            ACCEPTED_STATUSES,
            &descriptor.tracking_id,
            response,
        )?;
        info!(
            tracking_id = %result.tracking_id,
            attachments = package.attachments.len(),
            "Package accepted by intake service"
        );
        Ok(result)
    }
}
