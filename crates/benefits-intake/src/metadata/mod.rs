//! Routing metadata that travels with every upload.

pub mod builder;
pub mod validator;

use serde::{Deserialize, Serialize};

pub use builder::MetadataBuilder;
pub use validator::MetadataValidator;

/// Business lines the intake service routes on.
pub const BUSINESS_LINES: &[&str] = &["CMP", "PMC", "PMR", "EDU", "VRE", "BVA", "FID", "NCA", "OTH"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub veteran_first_name: String,
    pub veteran_last_name: String,
    pub file_number: String,
    pub zip_code: String,
    pub source: String,
    pub doc_type: String,
    pub business_line: String,
}

impl SubmissionMetadata {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
