//! Shared fixtures for submission and worker tests.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::claim::{Attachment, Claim};
use crate::config::{MetadataConfig, ProviderKind};
use crate::db::{claim_repo, Database};
use crate::metadata::MetadataBuilder;
use crate::stamp::testing::write_sample_pdf;
use crate::stamp::PdfStamper;
use crate::stats::InMemoryStats;
use crate::storage::ScratchDir;
use crate::upload::testing::FakeTransport;
use crate::upload::ProviderFactory;

use super::SubmitClaimJob;

pub struct Harness {
    pub dir: TempDir,
    pub scratch_root: PathBuf,
    pub db: Database,
    pub transport: Arc<FakeTransport>,
    pub stats: Arc<InMemoryStats>,
    pub job: SubmitClaimJob,
}

/// A job wired to an in-memory database and a fake intake transport that
/// answers with `statuses` in order, then 200. Counters use the `intake`
/// prefix.
pub fn harness(statuses: &[u16]) -> Harness {
    let dir = TempDir::new().unwrap();
    let scratch_root = dir.path().join("scratch");
    let db = Database::open_in_memory().unwrap();
    let transport = Arc::new(FakeTransport::with_statuses(statuses));
    let stats = Arc::new(InMemoryStats::new());

    let providers = ProviderFactory::new(ProviderKind::BenefitsIntake)
        .with_transport(ProviderKind::BenefitsIntake, transport.clone());
    let job = SubmitClaimJob::new(
        Arc::new(db.clone()),
        db.clone(),
        PdfStamper::new(ScratchDir::new(&scratch_root).unwrap()),
        MetadataBuilder::new(MetadataConfig::default()).unwrap(),
        providers,
        stats.clone(),
    )
    .with_metrics_prefix("intake");

    Harness {
        dir,
        scratch_root,
        db,
        transport,
        stats,
        job,
    }
}

/// Stores `claim` with a two-page base PDF and `attachments` one-page
/// attachments under `<dir>/claims`.
pub fn insert_claim(h: &Harness, claim: Claim, attachments: usize) -> Claim {
    let claims_dir = h.dir.path().join("claims");
    std::fs::create_dir_all(&claims_dir).unwrap();
    let base = claims_dir.join(format!("{}.pdf", claim.id));
    write_sample_pdf(&base, 2);

    let mut claim = claim;
    claim.attachments = (0..attachments)
        .map(|i| {
            let path = claims_dir.join(format!("{}-att{}.pdf", claim.id, i));
            write_sample_pdf(&path, 1);
            Attachment {
                id: format!("{}-a{}", claim.id, i),
                file_path: path,
            }
        })
        .collect();
    claim_repo::insert(&h.db, &claim, &base).unwrap();
    claim
}

pub fn scratch_is_empty(h: &Harness) -> bool {
    std::fs::read_dir(&h.scratch_root).unwrap().next().is_none()
}
