use std::sync::Arc;

use tracing::{debug, info};

use super::{
    accept_response, DocumentDescriptor, TransportRequest, UploadFile, UploadPackage,
    UploadProvider, UploadResult, UploadSession, UploadTransport,
};
use crate::error::UploadError;

const PROVIDER_NAME: &str = "legacy_claims";
const ACCEPTED_STATUSES: &[u16] = &[200, 201, 202];

/// "Other Correspondence", used for forms without a dedicated code.
pub const DEFAULT_DOCUMENT_CODE: &str = "L023";

const DOCUMENT_CODES: &[(&str, &str)] = &[
    ("21-4142", "L107"),
    ("21-4142a", "L107"),
    ("21-0781", "L228"),
    ("21-0781a", "L229"),
    ("21-8940", "L149"),
    ("21-10210", "L034"),
];

pub fn document_code(form_id: &str) -> &'static str {
    DOCUMENT_CODES
        .iter()
        .find(|(form, _)| form.eq_ignore_ascii_case(form_id))
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_DOCUMENT_CODE)
}

/// Legacy claims system: documents are filed under an existing claim id and
/// uploaded one at a time.
pub struct LegacyClaimsProvider {
    transport: Arc<dyn UploadTransport>,
    external_claim_id: Option<String>,
}

impl LegacyClaimsProvider {
    pub fn new(transport: Arc<dyn UploadTransport>, external_claim_id: Option<String>) -> Self {
        Self {
            transport,
            external_claim_id,
        }
    }

    fn send(
        &self,
        descriptor: &DocumentDescriptor,
        file: &UploadFile,
        metadata_json: &str,
        idempotency_key: &str,
    ) -> Result<UploadResult, UploadError> {
        let response = self.transport.upload(&TransportRequest {
            location: &descriptor.location,
            file,
            metadata_json,
            attachments: &[],
            idempotency_key,
        })?;
        accept_response(
            PROVIDER_NAME,
            ACCEPTED_STATUSES,
            &descriptor.tracking_id,
            response,
        )
    }
}

impl UploadProvider for LegacyClaimsProvider {
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
            document_type: document_code(document_type).to_string(),
            external_claim_id: self.external_claim_id.clone(),
        }
    }

    fn validate_document(&self, descriptor: &DocumentDescriptor) -> bool {
        descriptor
            .external_claim_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
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
                reason: "claim has no legacy claim id".to_string(),
            });
        }

        let metadata = serde_json::json!({
            "claimId": descriptor.external_claim_id,
            "documentType": descriptor.document_type,
            "fileName": descriptor.file_name,
            "trackingId": descriptor.tracking_id,
            "metadata": package.metadata,
        });
        let metadata_json = metadata.to_string();

        let result = self.send(
            descriptor,
            &package.document,
            &metadata_json,
            &package.idempotency_key,
        )?;

        for (i, attachment) in package.attachments.iter().enumerate() {
            let key = format!("{}-{}", package.idempotency_key, i + 1);
            let attachment_result = self.send(descriptor, attachment, &metadata_json, &key)?;
            debug!(
                file = %attachment.file_name,
                status = attachment_result.status,
                "Attachment accepted by legacy claims system"
            );
        }

        info!(
            tracking_id = %result.tracking_id,
            documents = package.attachments.len() + 1,
            "Documents accepted by legacy claims system"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::testing::{sample_package, FakeTransport};

    #[test]
    fn test_document_codes() {
        assert_eq!(document_code("21-4142"), "L107");
        assert_eq!(document_code("21-0781A"), "L229");
        assert_eq!(document_code("21P-527EZ"), DEFAULT_DOCUMENT_CODE);
    }

    #[test]
    fn test_each_document_is_sent_separately() {
        let transport = Arc::new(FakeTransport::with_statuses(&[201, 202, 200]));
        let provider = LegacyClaimsProvider::new(transport.clone(), Some("600123".to_string()));

        let session = provider.open_session().unwrap();
        let descriptor = provider.generate_document(&session, "form.pdf", "21-4142");
        assert_eq!(descriptor.document_type, "L107");
        assert!(provider.validate_document(&descriptor));

        let result = provider
            .submit_document(&descriptor, &sample_package(2))
            .unwrap();

        assert_eq!(result.status, 201);
        let uploads = transport.uploads();
        assert_eq!(uploads.len(), 3);
        assert!(uploads.iter().all(|u| u.attachment_names.is_empty()));
        assert_eq!(uploads[0].file_name, "form.pdf");
        assert_eq!(uploads[2].idempotency_key, "claim-guid-2");
        assert!(uploads[0].metadata_json.contains("\"claimId\":\"600123\""));
    }

    #[test]
    fn test_missing_claim_id_is_invalid() {
        let transport = Arc::new(FakeTransport::default());
        let provider = LegacyClaimsProvider::new(transport.clone(), None);
        let session = provider.open_session().unwrap();
        let descriptor = provider.generate_document(&session, "form.pdf", "21-4142");

        assert!(!provider.validate_document(&descriptor));
        let err = provider
            .submit_document(&descriptor, &sample_package(0))
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidDocument { .. }));
        assert!(transport.uploads().is_empty());
    }

    #[test]
    fn test_rejected_attachment_fails_submission() {
        let transport = Arc::new(FakeTransport::with_statuses(&[200, 503]));
        let provider = LegacyClaimsProvider::new(transport, Some("600123".to_string()));
        let session = provider.open_session().unwrap();
        let descriptor = provider.generate_document(&session, "form.pdf", "21-4142");

        let err = provider
            .submit_document(&descriptor, &sample_package(1))
            .unwrap_err();
        assert!(matches!(err, UploadError::Rejected { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
