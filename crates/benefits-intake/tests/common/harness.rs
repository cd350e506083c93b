//! Test harness for isolated submission runs.
//!
//! The `TestHarness` struct provides:
//! - Temporary claim and scratch directories
//! - An in-memory database serving as claim store and tracking store
//! - A recording upload transport with scripted response statuses
//! - In-memory counters

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use benefits_intake::claim::{Attachment, Claim};
use benefits_intake::config::{MetadataConfig, ProviderKind};
use benefits_intake::db::{claim_repo, Database};
use benefits_intake::error::UploadError;
use benefits_intake::metadata::MetadataBuilder;
use benefits_intake::stamp::{page_count, PdfStamper};
use benefits_intake::stats::InMemoryStats;
use benefits_intake::storage::ScratchDir;
use benefits_intake::submission::{RetryPolicy, SubmitClaimJob};
use benefits_intake::upload::{
    ProviderFactory, TransportRequest, TransportResponse, UploadSession, UploadTransport,
};
use benefits_intake::worker::WorkerPool;

use super::builders::{document_text, write_pdf};

/// What one upload call carried. Documents are inspected while the request
/// is in flight, because the scratch copies are gone afterwards.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub location: String,
    pub file_name: String,
    pub metadata: serde_json::Value,
    pub attachment_names: Vec<String>,
    pub idempotency_key: String,
    pub document_pages: usize,
    pub document_text: String,
    pub attachment_texts: Vec<String>,
}

/// Upload transport answering with queued statuses, then 200.
#[derive(Default)]
pub struct RecordingTransport {
    statuses: Mutex<VecDeque<u16>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    sessions: Mutex<u32>,
}

impl RecordingTransport {
    pub fn with_statuses(statuses: &[u16]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> u32 {
        *self.sessions.lock().unwrap()
    }
}

impl UploadTransport for RecordingTransport {
    fn open_session(&self) -> Result<UploadSession, UploadError> {
        let mut sessions = self.sessions.lock().unwrap();
        *sessions += 1;
        Ok(UploadSession {
            tracking_id: format!("uuid-{}", sessions),
            location: format!("https://intake.example.test/uploads/{}", sessions),
        })
    }

    fn upload(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, UploadError> {
        let recorded = RecordedUpload {
            location: request.location.to_string(),
            file_name: request.file.file_name.clone(),
            metadata: serde_json::from_str(request.metadata_json)
                .map_err(|e| UploadError::Transport(e.to_string()))?,
            attachment_names: request
                .attachments
                .iter()
                .map(|a| a.file_name.clone())
                .collect(),
            idempotency_key: request.idempotency_key.to_string(),
            document_pages: page_count(&request.file.path)
                .map_err(|e| UploadError::Transport(e.to_string()))?,
            document_text: document_text(&request.file.path),
            attachment_texts: request
                .attachments
                .iter()
                .map(|a| document_text(&a.path))
                .collect(),
        };
        self.uploads.lock().unwrap().push(recorded);

        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(TransportResponse {
            status,
            body: format!("{{\"status\": {}}}", status),
        })
    }
}

/// Test harness providing an isolated environment for integration tests.
pub struct TestHarness {
    temp_dir: TempDir,
    pub claims_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub db: Database,
    pub transport: Arc<RecordingTransport>,
    pub stats: Arc<InMemoryStats>,
}

impl TestHarness {
    /// A harness whose transport answers 200 to every upload.
    pub fn new() -> Self {
        Self::with_statuses(&[])
    }

    /// A harness whose transport answers with `statuses` in order, then 200.
    pub fn with_statuses(statuses: &[u16]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let claims_dir = temp_dir.path().join("claims");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&claims_dir).expect("Failed to create claims dir");

        Self {
            temp_dir,
            claims_dir,
            scratch_dir,
            db: Database::open_in_memory().expect("Failed to open database"),
            transport: Arc::new(RecordingTransport::with_statuses(statuses)),
            stats: Arc::new(InMemoryStats::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A job wired to the harness. Counters use the `intake` prefix.
    pub fn job(&self) -> SubmitClaimJob {
        self.job_with(self.providers())
    }

    /// Like [`TestHarness::job`], with `form_id` routed to `kind`. Both
    /// providers share the recording transport.
    pub fn job_routing(&self, form_id: &str, kind: ProviderKind) -> SubmitClaimJob {
        self.job_with(self.providers().with_override(form_id, kind))
    }

    fn providers(&self) -> ProviderFactory {
        ProviderFactory::new(ProviderKind::BenefitsIntake)
            .with_transport(ProviderKind::BenefitsIntake, self.transport.clone())
            .with_transport(ProviderKind::LegacyClaims, self.transport.clone())
    }

    fn job_with(&self, providers: ProviderFactory) -> SubmitClaimJob {
        SubmitClaimJob::new(
            Arc::new(self.db.clone()),
            self.db.clone(),
            PdfStamper::new(ScratchDir::new(&self.scratch_dir).expect("Failed to create scratch")),
            MetadataBuilder::new(MetadataConfig::default()).expect("Failed to build metadata"),
            providers,
            self.stats.clone(),
        )
        .with_metrics_prefix("intake")
    }

    /// A worker pool running the harness job with `policy`.
    pub fn pool(&self, policy: RetryPolicy, workers: usize) -> WorkerPool {
        WorkerPool::new(Arc::new(self.job()), self.db.clone(), policy, workers)
            .expect("Failed to start worker pool")
    }

    /// Stores `claim` with a base PDF of `pages` pages and one single-page
    /// attachment per entry in `attachments`.
    pub fn store_claim(&self, claim: Claim, pages: usize, attachments: usize) -> Claim {
        let base = self.claims_dir.join(format!("{}.pdf", claim.id));
        write_pdf(&base, pages);

        let mut claim = claim;
        claim.attachments = (0..attachments)
            .map(|i| {
                let path = self.claims_dir.join(format!("{}-attachment-{}.pdf", claim.id, i));
                write_pdf(&path, 1);
                Attachment {
                    id: format!("{}-{}", claim.id, i),
                    file_path: path,
                }
            })
            .collect();

        claim_repo::insert(&self.db, &claim, &base).expect("Failed to store claim");
        claim
    }

    pub fn scratch_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.scratch_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    pub fn count(&self, metric: &str) -> u64 {
        self.stats.count(&format!("intake.{}", metric))
    }
}
