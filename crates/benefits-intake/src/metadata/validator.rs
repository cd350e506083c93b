use std::sync::LazyLock;

use jsonschema::Validator;
use regex::Regex;
use serde_json::{Map, Value};

use super::SubmissionMetadata;
use crate::error::MetadataError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/submission-metadata.json");

const MAX_NAME_LENGTH: usize = 50;

static RE_NAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z\-/' ]").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
static RE_ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{5}(-?\d{4})?$").unwrap());

/// Schema check plus normalization of the assembled metadata map.
pub struct MetadataValidator {
    schema: Validator,
    foreign_postal_code: String,
}

impl MetadataValidator {
    pub fn new(foreign_postal_code: impl Into<String>) -> Result<Self, MetadataError> {
        let schema: Value =
            serde_json::from_str(SCHEMA_JSON).map_err(|e| MetadataError::Validation {
                errors: format!("Invalid embedded schema JSON: {}", e),
            })?;
        let schema = jsonschema::validator_for(&schema).map_err(|e| MetadataError::Validation {
            errors: format!("Failed to compile metadata schema: {}", e),
        })?;
        Ok(Self {
            schema,
            foreign_postal_code: foreign_postal_code.into(),
        })
    }

    /// Rejects maps with missing, mistyped or out-of-set values, then
    /// normalizes the free-text fields.
    pub fn validate(&self, raw: Map<String, Value>) -> Result<SubmissionMetadata, MetadataError> {
        let value = Value::Object(raw);

        let errors: Vec<String> = self
            .schema
            .iter_errors(&value)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(MetadataError::Validation {
                errors: errors.join("; "),
            });
        }

        let mut metadata: SubmissionMetadata =
            serde_json::from_value(value).map_err(|e| MetadataError::Validation {
                errors: e.to_string(),
            })?;

        metadata.veteran_first_name =
            normalize_name("veteranFirstName", &metadata.veteran_first_name)?;
        metadata.veteran_last_name =
            normalize_name("veteranLastName", &metadata.veteran_last_name)?;
        metadata.file_number = normalize_file_number(&metadata.file_number)?;
        metadata.zip_code = self.normalize_zip(&metadata.zip_code);

        Ok(metadata)
    }

    /// ZIP and ZIP+4 come out as `12345` or `12345-6789`. Anything else,
    /// including a missing code, becomes the unknown-code sentinel.
    fn normalize_zip(&self, zip: &str) -> String {
        let zip = zip.trim();
        if !RE_ZIP.is_match(zip) {
            return self.foreign_postal_code.clone();
        }
        let digits: String = zip.chars().filter(char::is_ascii_digit).collect();
        match digits.split_at_checked(5) {
            Some((five, plus4)) if !plus4.is_empty() => format!("{}-{}", five, plus4),
            _ => digits,
        }
    }
}

fn normalize_name(field: &str, name: &str) -> Result<String, MetadataError> {
    let cleaned = RE_NAME_DISALLOWED.replace_all(name, "");
    let cleaned = RE_WHITESPACE.replace_all(cleaned.trim(), " ");
    let truncated: String = cleaned.chars().take(MAX_NAME_LENGTH).collect();
    let truncated = truncated.trim_end().to_string();

    if truncated.is_empty() {
        return Err(MetadataError::Validation {
            errors: format!("{} is empty after normalization", field),
        });
    }
    Ok(truncated)
}

fn normalize_file_number(file_number: &str) -> Result<String, MetadataError> {
    let digits = RE_NON_DIGIT.replace_all(file_number, "").to_string();
    if !(8..=9).contains(&digits.len()) {
        return Err(MetadataError::Validation {
            errors: format!(
                "fileNumber must have 8 or 9 digits, found {}",
                digits.len()
            ),
        });
    }
    Ok(digits)
}
