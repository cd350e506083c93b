use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::claim::{Claim, ClaimSource, Confirmation, ConfirmationHook};
use crate::config::{Config, StampsConfig};
use crate::db::{submission_repo, AttemptStatus, Database};
use crate::error::IntakeError;
use crate::metadata::MetadataBuilder;
use crate::sanitize;
use crate::stamp::{PdfStamper, StampSpec};
use crate::stats::{StatKeys, StatsSink, DEFAULT_METRICS_PREFIX};
use crate::storage::{ScratchDir, TempFiles};
use crate::upload::{ProviderFactory, UploadFile, UploadPackage, UploadProvider};

use super::context::{SubmissionContext, SubmissionOutcome};
use super::SubmissionState;

/// Submits one claim to the configured upload backend.
///
/// Every execution runs the same steps in order: load the claim, render and
/// stamp the primary document and each attachment, build metadata, record
/// the attempt, upload. Errors are logged with context and returned to the
/// caller, who owns retries. Scratch files are removed on every exit path.
pub struct SubmitClaimJob {
    claims: Arc<dyn ClaimSource>,
    db: Database,
    stamper: PdfStamper,
    stamps: Vec<StampSpec>,
    metadata: MetadataBuilder,
    providers: ProviderFactory,
    stats: Arc<dyn StatsSink>,
    keys: StatKeys,
    confirmation: Option<Arc<dyn ConfirmationHook>>,
}

impl SubmitClaimJob {
    /// Production constructor: claims are served by the database.
    pub fn from_config(
        config: &Config,
        db: Database,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Self, IntakeError> {
        let scratch = ScratchDir::new(&config.scratch_directory)?;
        let metadata = MetadataBuilder::new(config.metadata.clone())?;
        let providers = ProviderFactory::from_config(&config.upload)?;

        Ok(Self::new(
            Arc::new(db.clone()),
            db,
            PdfStamper::new(scratch),
            metadata,
            providers,
            stats,
        )
        .with_stamps(config.stamps.in_order())
        .with_metrics_prefix(&config.metrics_prefix))
    }

    pub fn new(
        claims: Arc<dyn ClaimSource>,
        db: Database,
        stamper: PdfStamper,
        metadata: MetadataBuilder,
        providers: ProviderFactory,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            claims,
            db,
            stamper,
            stamps: StampsConfig::default().in_order(),
            metadata,
            providers,
            stats,
            keys: StatKeys::new(DEFAULT_METRICS_PREFIX),
            confirmation: None,
        }
    }

    /// Stamps applied to every document, in order.
    pub fn with_stamps(mut self, stamps: Vec<StampSpec>) -> Self {
        self.stamps = stamps;
        self
    }

    pub fn with_metrics_prefix(mut self, prefix: &str) -> Self {
        self.keys = StatKeys::new(prefix);
        self
    }

    pub fn with_confirmation_hook(mut self, hook: Arc<dyn ConfirmationHook>) -> Self {
        self.confirmation = Some(hook);
        self
    }

    pub fn stat_keys(&self) -> &StatKeys {
        &self.keys
    }

    pub fn stats(&self) -> Arc<dyn StatsSink> {
        Arc::clone(&self.stats)
    }

    /// Runs one execution for `claim_id` as part of job `job_id`.
    pub fn perform(&self, claim_id: &str, job_id: &str) -> Result<SubmissionOutcome, IntakeError> {
        let _job_span = info_span!("submit_claim", claim_id = %claim_id, job_id = %job_id).entered();

        let mut ctx = SubmissionContext::new(claim_id, job_id);
        let result = self.run(&mut ctx);

        {
            let _step = info_span!("cleanup").entered();
            let count = ctx.temp_files.tracked().len();
            ctx.temp_files.cleanup();
            debug!(files = count, "Removed temporary files");
        }

        match &result {
            Ok(outcome) => {
                ctx.state = SubmissionState::Succeeded;
                self.stats.increment(&self.keys.success());
                info!(
                    tracking_id = %outcome.tracking_id,
                    provider = %outcome.provider,
                    documents = outcome.documents,
                    "Claim submitted"
                );
            }
            Err(e) => {
                let failed_during = ctx.fail(e);
                self.stats.increment(&self.keys.failure());
                if let Some(attempt_id) = ctx.attempt_id {
                    self.finish_attempt(attempt_id, AttemptStatus::Failure, Some(&e.to_string()));
                }
                warn!(
                    claim_id = %ctx.claim_id,
                    doc_type = ctx.form_id.as_deref().unwrap_or("unknown"),
                    tracking_id = ctx.tracking_id.as_deref().unwrap_or("none"),
                    failed_during = %failed_during,
                    error_class = e.error_class(),
                    retryable = e.is_retryable(),
                    "Submission failed: {}",
                    e
                );
            }
        }

        result
    }

    fn run(&self, ctx: &mut SubmissionContext) -> Result<SubmissionOutcome, IntakeError> {
        let claim = {
            let _step = info_span!("load_claim").entered();
            self.claims
                .find(&ctx.claim_id)?
                .ok_or_else(|| IntakeError::ClaimNotFound {
                    claim_id: ctx.claim_id.clone(),
                })?
        };
        ctx.form_id = Some(claim.form_id.clone());

        ctx.state = SubmissionState::Rendering;
        let (document, attachments) = {
            let _step = info_span!("render", attachments = claim.attachments.len()).entered();
            self.step_render(&claim, &ctx.temp_files)?
        };

        ctx.state = SubmissionState::BuildingMetadata;
        let metadata = {
            let _step = info_span!("build_metadata", form_id = %claim.form_id).entered();
            self.metadata.build(&claim)?
        };

        ctx.state = SubmissionState::Uploading;
        let provider = self.providers.provider_for(&claim)?;
        let (session, attempt_id) = {
            let _step = info_span!("record_attempt", provider = provider.name()).entered();
            let session = provider.open_session()?;
            ctx.tracking_id = Some(session.tracking_id.clone());

            let record = submission_repo::find_or_create_record(
                &self.db,
                &claim.id,
                &claim.form_id,
                &claim.form.to_string(),
                &session.tracking_id,
            )?;
            let attempt_id = submission_repo::create_attempt(
                &self.db,
                record.id,
                &session.tracking_id,
                &ctx.job_id,
                provider.name(),
            )?;
            ctx.attempt_id = Some(attempt_id);
            debug!(
                record_id = record.id,
                attempt_id,
                tracking_id = %session.tracking_id,
                "Submission attempt recorded"
            );
            (session, attempt_id)
        };

        let documents = 1 + attachments.len();
        let result = {
            let _step = info_span!(
                "upload",
                provider = provider.name(),
                tracking_id = %session.tracking_id
            )
            .entered();
            let descriptor = provider.generate_document(
                &session,
                &format!("{}.pdf", claim.form_id),
                &claim.form_id,
            );
            let package = UploadPackage {
                document: UploadFile {
                    path: document,
                    file_name: descriptor.file_name.clone(),
                },
                attachments: attachments
                    .into_iter()
                    .enumerate()
                    .map(|(i, path)| UploadFile {
                        path,
                        file_name: format!("attachment_{}.pdf", i + 1),
                    })
                    .collect(),
                metadata,
                idempotency_key: claim.guid.clone(),
            };
            provider.submit_document(&descriptor, &package)?
        };

        let confirmation = Confirmation {
            tracking_id: result.tracking_id.clone(),
            provider: provider.name().to_string(),
        };
        self.step_confirm(&claim, attempt_id, &confirmation);

        Ok(SubmissionOutcome {
            claim_id: claim.id.clone(),
            job_id: ctx.job_id.clone(),
            tracking_id: result.tracking_id,
            provider: provider.name().to_string(),
            attempt_id,
            documents,
        })
    }

    /// Renders and stamps the primary document and every attachment.
    fn step_render(
        &self,
        claim: &Claim,
        temp_files: &TempFiles,
    ) -> Result<(PathBuf, Vec<PathBuf>), IntakeError> {
        let scratch = self.stamper.scratch();

        let rendered = self.claims.render(claim, scratch)?;
        temp_files.track(&rendered);
        let document = self.stamp_document(&rendered, temp_files)?;

        let mut attachments = Vec::with_capacity(claim.attachments.len());
        for attachment in &claim.attachments {
            let rendered = self.claims.render_attachment(claim, attachment, scratch)?;
            temp_files.track(&rendered);
            attachments.push(self.stamp_document(&rendered, temp_files)?);
        }

        Ok((document, attachments))
    }

    fn stamp_document(&self, source: &Path, temp_files: &TempFiles) -> Result<PathBuf, IntakeError> {
        let _step = info_span!("stamp", file = %sanitize::redact_path(source)).entered();
        let mut current = source.to_path_buf();
        for spec in &self.stamps {
            current = self.stamper.stamp(&current, spec)?;
            temp_files.track(&current);
        }
        Ok(current)
    }

    /// Bookkeeping after the backend accepted the upload. Nothing here can
    /// fail the execution: a retry would upload the package again.
    fn step_confirm(&self, claim: &Claim, attempt_id: i64, confirmation: &Confirmation) {
        self.finish_attempt(attempt_id, AttemptStatus::Success, None);

        if let Err(e) = self.claims.mark_submitted(&claim.id, confirmation) {
            error!(claim_id = %claim.id, "Failed to mark claim as submitted: {}", e);
        }

        if let Some(hook) = &self.confirmation {
            if let Err(e) = hook.on_submitted(claim, confirmation) {
                error!(claim_id = %claim.id, "Confirmation hook failed: {}", e);
            }
        }
    }

    fn finish_attempt(&self, attempt_id: i64, status: AttemptStatus, error_message: Option<&str>) {
        if let Err(e) =
            submission_repo::update_attempt_status(&self.db, attempt_id, status, error_message)
        {
            error!(attempt_id, status = %status, "Failed to update submission attempt: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::claim_repo::{self, testing::sample_claim};
    use crate::error::{ClaimError, UploadError};
    use crate::stamp::testing::page_text;
    use crate::submission::testing::{harness, insert_claim, scratch_is_empty};
    use std::sync::Mutex;

    #[test]
    fn test_submits_document_and_attachments() {
        let h = harness(&[]);
        insert_claim(&h, sample_claim("42"), 2);

        let outcome = h.job.perform("42", "job-1").unwrap();

        assert_eq!(outcome.documents, 3);
        assert_eq!(outcome.tracking_id, "tracking-1");
        assert_eq!(outcome.provider, "benefits_intake");

        let uploads = h.transport.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].file_name, "21P-527EZ.pdf");
        assert_eq!(
            uploads[0].attachment_names,
            vec!["attachment_1.pdf", "attachment_2.pdf"]
        );
        assert_eq!(uploads[0].idempotency_key, "guid-42");
        assert!(uploads[0].metadata_json.contains("\"docType\":\"21P-527EZ\""));

        let attempts = submission_repo::attempts_for_claim(&h.db, "42").unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, "success");
        assert_eq!(attempts[0].job_id, "job-1");

        let stored = claim_repo::find(&h.db, "42").unwrap().unwrap();
        assert_eq!(stored.status, "submitted");
        assert_eq!(stored.tracking_id.as_deref(), Some("tracking-1"));

        assert_eq!(h.stats.count("intake.success"), 1);
        assert!(scratch_is_empty(&h));
    }

    #[test]
    fn test_stored_documents_are_not_modified() {
        let h = harness(&[]);
        insert_claim(&h, sample_claim("42"), 1);
        let base = h.dir.path().join("claims").join("42.pdf");
        let before = std::fs::read(&base).unwrap();

        h.job.perform("42", "job-1").unwrap();

        assert_eq!(std::fs::read(&base).unwrap(), before);
        assert!(!page_text(&base, 1).contains("VA.GOV"));
    }

    #[test]
    fn test_server_error_is_returned_and_cleaned_up() {
        let h = harness(&[503]);
        insert_claim(&h, sample_claim("42"), 1);

        let err = h.job.perform("42", "job-1").unwrap_err();

        assert!(matches!(
            err,
            IntakeError::Upload(UploadError::Rejected { status: 503, .. })
        ));
        assert!(err.is_retryable());

        let attempts = submission_repo::attempts_for_claim(&h.db, "42").unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, "failure");
        assert!(attempts[0].error_message.as_deref().unwrap().contains("503"));

        let stored = claim_repo::find(&h.db, "42").unwrap().unwrap();
        assert_eq!(stored.status, "pending");
        assert_eq!(h.stats.count("intake.failure"), 1);
        assert_eq!(h.stats.count("intake.success"), 0);
        assert!(scratch_is_empty(&h));
    }

    #[test]
    fn test_retry_reuses_submission_record() {
        let h = harness(&[500]);
        insert_claim(&h, sample_claim("42"), 0);

        assert!(h.job.perform("42", "job-1").is_err());
        let outcome = h.job.perform("42", "job-1").unwrap();

        let record = submission_repo::find_record_by_claim(&h.db, "42")
            .unwrap()
            .unwrap();
        assert_eq!(record.benefits_intake_uuid, "tracking-1");

        let attempts = submission_repo::attempts_for_claim(&h.db, "42").unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status, "failure");
        assert_eq!(attempts[1].status, "success");
        assert_eq!(attempts[1].benefits_intake_uuid, outcome.tracking_id);
    }

    #[test]
    fn test_missing_claim_fails_fast() {
        let h = harness(&[]);

        let err = h.job.perform("nope", "job-1").unwrap_err();

        assert!(matches!(err, IntakeError::ClaimNotFound { .. }));
        assert!(!err.is_retryable());
        assert!(h.transport.uploads().is_empty());
    }

    #[test]
    fn test_invalid_metadata_stops_before_upload() {
        let h = harness(&[]);
        let mut claim = sample_claim("42");
        claim.form = serde_json::json!({ "vaFileNumber": "796043735" });
        insert_claim(&h, claim, 1);

        let err = h.job.perform("42", "job-1").unwrap_err();

        assert!(matches!(err, IntakeError::Metadata(_)));
        assert!(!err.is_retryable());
        assert!(submission_repo::find_record_by_claim(&h.db, "42")
            .unwrap()
            .is_none());
        assert!(h.transport.uploads().is_empty());
        assert!(scratch_is_empty(&h));
    }

    #[test]
    fn test_stamp_failure_cleans_up() {
        let h = harness(&[]);
        let claim = insert_claim(&h, sample_claim("42"), 1);
        std::fs::write(&claim.attachments[0].file_path, b"not a pdf").unwrap();

        let err = h.job.perform("42", "job-1").unwrap_err();

        assert!(matches!(err, IntakeError::Stamp(_)));
        assert!(err.is_retryable());
        assert!(scratch_is_empty(&h));
    }

    struct RecordingHook {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ConfirmationHook for RecordingHook {
        fn on_submitted(&self, claim: &Claim, confirmation: &Confirmation) -> Result<(), ClaimError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", claim.id, confirmation.tracking_id));
            if self.fail {
                return Err(ClaimError::Store("mailer down".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_confirmation_hook_runs_on_success() {
        let hook = Arc::new(RecordingHook {
            calls: Mutex::new(vec![]),
            fail: false,
        });
        let mut h = harness(&[]);
        h.job = h.job.with_confirmation_hook(hook.clone());
        insert_claim(&h, sample_claim("42"), 0);

        h.job.perform("42", "job-1").unwrap();

        assert_eq!(*hook.calls.lock().unwrap(), vec!["42:tracking-1"]);
    }

    #[test]
    fn test_failing_confirmation_hook_does_not_fail_submission() {
        let hook = Arc::new(RecordingHook {
            calls: Mutex::new(vec![]),
            fail: true,
        });
        let mut h = harness(&[]);
        h.job = h.job.with_confirmation_hook(hook.clone());
        insert_claim(&h, sample_claim("42"), 0);

        assert!(h.job.perform("42", "job-1").is_ok());
        assert_eq!(hook.calls.lock().unwrap().len(), 1);
        assert_eq!(h.stats.count("intake.success"), 1);
    }
}
