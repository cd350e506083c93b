pub mod claim;
pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod sanitize;
pub mod secrets;
pub mod stamp;
pub mod stats;
pub mod storage;
pub mod submission;
pub mod telemetry;
pub mod upload;
pub mod worker;

pub use claim::{Attachment, Claim, ClaimSource, Confirmation, ConfirmationHook};
pub use config::{load_config, Config, ProviderKind};
pub use db::Database;
pub use error::{
    ClaimError, ConfigError, IntakeError, MetadataError, Result, StampError, StorageError,
    UploadError, WorkerError,
};
pub use metadata::{MetadataBuilder, MetadataValidator};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use stamp::PdfStamper;
pub use stats::{InMemoryStats, PrometheusStats, StatKeys, StatsSink};
pub use submission::{ExhaustionHandler, RetryPolicy, SubmitClaimJob};
pub use upload::{ProviderFactory, UploadProvider};
pub use worker::WorkerPool;
