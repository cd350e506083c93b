use serde_json::{Map, Value};
use tracing::debug;

use super::{MetadataValidator, SubmissionMetadata};
use crate::claim::Claim;
use crate::config::MetadataConfig;
use crate::error::MetadataError;

/// Assembles routing metadata from a claim.
///
/// Identity fields come from the claim's form; document type and business
/// line come from the claim record itself so form input cannot reroute a
/// submission.
pub struct MetadataBuilder {
    config: MetadataConfig,
    validator: MetadataValidator,
}

impl MetadataBuilder {
    pub fn new(config: MetadataConfig) -> Result<Self, MetadataError> {
        let validator = MetadataValidator::new(config.foreign_postal_code.clone())?;
        Ok(Self { config, validator })
    }

    pub fn build(&self, claim: &Claim) -> Result<SubmissionMetadata, MetadataError> {
        let raw = self.assemble(claim)?;
        let metadata = self.validator.validate(raw)?;
        debug!(
            claim_id = %claim.id,
            doc_type = %metadata.doc_type,
            business_line = %metadata.business_line,
            "Metadata built"
        );
        Ok(metadata)
    }

    fn assemble(&self, claim: &Claim) -> Result<Map<String, Value>, MetadataError> {
        let full_name = claim
            .form_field("veteranFullName")
            .ok_or(MetadataError::MissingField {
                field: "veteranFullName",
            })?;
        let first = string_at(full_name, "first").ok_or(MetadataError::MissingField {
            field: "veteranFullName.first",
        })?;
        let last = string_at(full_name, "last").ok_or(MetadataError::MissingField {
            field: "veteranFullName.last",
        })?;

        let file_number = claim
            .form_field("vaFileNumber")
            .and_then(non_empty_str)
            .or_else(|| {
                claim
                    .form_field("veteranSocialSecurityNumber")
                    .and_then(non_empty_str)
            })
            .ok_or(MetadataError::MissingField {
                field: "vaFileNumber",
            })?;

        let address = claim
            .form_field("claimantAddress")
            .or_else(|| claim.form_field("veteranAddress"))
            .ok_or(MetadataError::MissingField {
                field: "claimantAddress",
            })?;

        let mut raw = Map::new();
        raw.insert("veteranFirstName".into(), first.into());
        raw.insert("veteranLastName".into(), last.into());
        raw.insert("fileNumber".into(), file_number.into());
        raw.insert("zipCode".into(), self.postal_code(address).into());
        raw.insert(
            "source".into(),
            format!("{} {}", claim.claim_type, self.config.source_suffix).into(),
        );
        raw.insert("docType".into(), claim.form_id.clone().into());
        raw.insert("businessLine".into(), claim.business_line.clone().into());
        Ok(raw)
    }

    /// Domestic addresses pass their postal code on for the validator to
    /// normalize; anything else gets the foreign sentinel.
    fn postal_code(&self, address: &Value) -> String {
        let domestic = string_at(address, "country")
            .is_some_and(|country| country == self.config.domestic_country);
        if domestic {
            string_at(address, "postalCode").unwrap_or_default()
        } else {
            self.config.foreign_postal_code.clone()
        }
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(non_empty_str)
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claim(form: Value) -> Claim {
        Claim {
            id: "11".to_string(),
            guid: "6d8433c1-cd55-4c24-affd-f592287a7572".to_string(),
            form_id: "21P-527EZ".to_string(),
            claim_type: "SavedClaim::Pension".to_string(),
            business_line: "PMC".to_string(),
            form,
            attachments: vec![],
            submitted_claim_id: None,
        }
    }

    fn builder() -> MetadataBuilder {
        MetadataBuilder::new(MetadataConfig::default()).unwrap()
    }

    fn pension_form() -> Value {
        json!({
            "veteranFullName": { "first": "Test", "last": "User" },
            "vaFileNumber": "796043735",
            "veteranSocialSecurityNumber": "333224444",
            "veteranAddress": { "country": "USA", "postalCode": "12345" }
        })
    }

    #[test]
    fn test_domestic_address_keeps_postal_code() {
        let metadata = builder().build(&claim(pension_form())).unwrap();
        assert_eq!(metadata.zip_code, "12345");
        assert_eq!(metadata.veteran_first_name, "Test");
        assert_eq!(metadata.veteran_last_name, "User");
        assert_eq!(metadata.file_number, "796043735");
        assert_eq!(metadata.source, "SavedClaim::Pension va.gov");
        assert_eq!(metadata.doc_type, "21P-527EZ");
        assert_eq!(metadata.business_line, "PMC");
    }

    #[test]
    fn test_foreign_address_uses_sentinel() {
        let mut form = pension_form();
        form["veteranAddress"] = json!({ "country": "MEX", "postalCode": "06700" });
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.zip_code, "00000");
    }

    #[test]
    fn test_missing_country_counts_as_foreign() {
        let mut form = pension_form();
        form["veteranAddress"] = json!({ "postalCode": "12345" });
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.zip_code, "00000");
    }

    #[test]
    fn test_claimant_address_wins_over_veteran_address() {
        let mut form = pension_form();
        form["claimantAddress"] = json!({ "country": "USA", "postalCode": "54321" });
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.zip_code, "54321");
    }

    #[test]
    fn test_ssn_fallback_when_no_file_number() {
        let mut form = pension_form();
        form.as_object_mut().unwrap().remove("vaFileNumber");
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.file_number, "333224444");
    }

    #[test]
    fn test_blank_file_number_falls_back_to_ssn() {
        let mut form = pension_form();
        form["vaFileNumber"] = json!("");
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.file_number, "333224444");
    }

    #[test]
    fn test_form_cannot_override_routing() {
        let mut form = pension_form();
        form["businessLine"] = json!("EDU");
        form["docType"] = json!("99-9999");
        let metadata = builder().build(&claim(form)).unwrap();
        assert_eq!(metadata.business_line, "PMC");
        assert_eq!(metadata.doc_type, "21P-527EZ");
    }

    #[test]
    fn test_missing_name_is_error() {
        let mut form = pension_form();
        form.as_object_mut().unwrap().remove("veteranFullName");
        let err = builder().build(&claim(form)).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::MissingField {
                field: "veteranFullName"
            }
        ));
    }

    #[test]
    fn test_missing_address_is_error() {
        let mut form = pension_form();
        form.as_object_mut().unwrap().remove("veteranAddress");
        let err = builder().build(&claim(form)).unwrap_err();
        assert!(matches!(err, MetadataError::MissingField { .. }));
    }

    #[test]
    fn test_invalid_business_line_on_claim_is_rejected() {
        let mut c = claim(pension_form());
        c.business_line = "ZZZ".to_string();
        let err = builder().build(&c).unwrap_err();
        assert!(matches!(err, MetadataError::Validation { .. }));
    }
}
