use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::stamp::StampSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub scratch_directory: String,
    pub database_path: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_metrics_prefix")]
    pub metrics_prefix: String,
    #[serde(default)]
    pub retry: RetryConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub stamps: StampsConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_metrics_prefix() -> String {
    crate::stats::DEFAULT_METRICS_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Replaces the polynomial schedule with one constant delay.
    #[serde(default)]
    pub fixed_delay_secs: Option<u64>,
}

fn default_max_retries() -> u32 {
    14
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            jitter: true,
            fixed_delay_secs: None,
        }
    }
}

/// Which upload integration handles a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    BenefitsIntake,
    LegacyClaims,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::BenefitsIntake => "benefits_intake",
            ProviderKind::LegacyClaims => "legacy_claims",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// Form id → provider, overriding `provider` for specific forms.
    #[serde(default)]
    pub form_overrides: HashMap<String, ProviderKind>,
    pub benefits_intake: EndpointConfig,
    #[serde(default)]
    pub legacy_claims: Option<EndpointConfig>,
}

fn default_provider() -> ProviderKind {
    ProviderKind::BenefitsIntake
}

impl UploadConfig {
    pub fn provider_for(&self, form_id: &str) -> ProviderKind {
        self.form_overrides
            .get(form_id)
            .copied()
            .unwrap_or(self.provider)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub session_path: Option<String>,
    #[serde(default)]
    pub upload_path: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_domestic_country")]
    pub domestic_country: String,
    #[serde(default = "default_foreign_postal_code")]
    pub foreign_postal_code: String,
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,
}

fn default_domestic_country() -> String {
    "USA".to_string()
}

fn default_foreign_postal_code() -> String {
    "00000".to_string()
}

fn default_source_suffix() -> String {
    "va.gov".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            domestic_country: default_domestic_country(),
            foreign_postal_code: default_foreign_postal_code(),
            source_suffix: default_source_suffix(),
        }
    }
}

/// The two stamps every claim PDF receives, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampsConfig {
    #[serde(default = "default_receipt_stamp")]
    pub receipt: StampSpec,
    #[serde(default = "default_program_stamp")]
    pub program: StampSpec,
}

fn default_receipt_stamp() -> StampSpec {
    StampSpec::new("VA.GOV", 5.0, 5.0)
}

fn default_program_stamp() -> StampSpec {
    StampSpec::new("FDC Reviewed - va.gov Submission", 429.0, 770.0).text_only()
}

impl Default for StampsConfig {
    fn default() -> Self {
        Self {
            receipt: default_receipt_stamp(),
            program: default_program_stamp(),
        }
    }
}

impl StampsConfig {
    pub fn in_order(&self) -> Vec<StampSpec> {
        vec![self.receipt.clone(), self.program.clone()]
    }
}
