use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Claim not found: {claim_id}")]
    ClaimNotFound { claim_id: String },

    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    #[error("Stamping error: {0}")]
    Stamp(#[from] StampError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl IntakeError {
    /// Whether the scheduler should spend another attempt on this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            IntakeError::ClaimNotFound { .. } => false,
            IntakeError::Claim(_) => true,
            IntakeError::Stamp(e) => e.is_retryable(),
            IntakeError::Metadata(_) => false,
            IntakeError::Upload(e) => e.is_retryable(),
            IntakeError::Storage(_) => true,
            IntakeError::Config(_) => false,
            IntakeError::Worker(_) => true,
            IntakeError::Database(_) => true,
        }
    }

    /// Stable class name recorded alongside job errors.
    pub fn error_class(&self) -> &'static str {
        match self {
            IntakeError::ClaimNotFound { .. } => "ClaimNotFoundError",
            IntakeError::Claim(_) => "ClaimError",
            IntakeError::Stamp(StampError::Verification { .. })
            | IntakeError::Stamp(StampError::PageCountChanged { .. }) => "StampVerificationError",
            IntakeError::Stamp(_) => "StampGenerationError",
            IntakeError::Metadata(_) => "MetadataValidationError",
            IntakeError::Upload(UploadError::Rejected { .. }) => "UploadRejectedError",
            IntakeError::Upload(UploadError::Timeout(_)) => "TransportTimeoutError",
            IntakeError::Upload(_) => "UploadError",
            IntakeError::Storage(_) => "StorageError",
            IntakeError::Config(_) => "ConfigError",
            IntakeError::Worker(_) => "WorkerError",
            IntakeError::Database(_) => "DatabaseError",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Secret for '{name}' could not be resolved: {source}")]
    Secret {
        name: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum StampError {
    #[error("The provided stamp content was empty")]
    EmptyText,

    #[error("Failed to generate stamp: {0}")]
    Generation(String),

    #[error("Failed to merge stamp into '{path}': {reason}")]
    Merge { path: PathBuf, reason: String },

    #[error("The PDF remained unchanged upon stamping: '{path}' ({original_size} -> {stamped_size} bytes)")]
    Verification {
        path: PathBuf,
        original_size: u64,
        stamped_size: u64,
    },

    #[error("Stamping changed the page count of '{path}' from {expected} to {actual}")]
    PageCountChanged {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StampError {
    /// A regenerated source may stamp cleanly, so only empty input is fatal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StampError::EmptyText)
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Claim form is missing '{field}'")]
    MissingField { field: &'static str },

    #[error("Metadata failed validation: {errors}")]
    Validation { errors: String },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{provider} rejected the upload with status {status}: {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Upload document is invalid for {provider}: {reason}")]
    InvalidDocument {
        provider: &'static str,
        reason: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Transport timed out: {0}")]
    Timeout(String),

    #[error("Failed to read upload file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// 5xx, request timeout and throttling are transient; other 4xx are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            UploadError::InvalidDocument { .. } => false,
            UploadError::Transport(_) | UploadError::Timeout(_) => true,
            UploadError::ReadFile { .. } => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Failed to render document for claim '{claim_id}': {reason}")]
    Render { claim_id: String, reason: String },

    #[error("Claim store failure: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Claim '{0}' already has a submission in flight")]
    AlreadyInFlight(String),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
