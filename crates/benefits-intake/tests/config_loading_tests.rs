//! Table-driven tests for configuration loading and validation.

use benefits_intake::config::{load_config, load_config_from_str, ProviderKind};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "upload": { "benefits_intake": { "base_url": "https://intake.example.test" } }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "worker_count": 4,
            "metrics_prefix": "intake",
            "retry": { "max_retries": 10, "jitter": false, "fixed_delay_secs": 30 },
            "upload": {
                "provider": "benefits_intake",
                "form_overrides": { "21-4142": "legacy_claims" },
                "benefits_intake": {
                    "base_url": "https://intake.example.test",
                    "session_path": "/uploads",
                    "api_key_env": "INTAKE_API_KEY",
                    "timeout_secs": 60
                },
                "legacy_claims": { "base_url": "https://claims.example.test" }
            },
            "metadata": {
                "domestic_country": "USA",
                "foreign_postal_code": "00000",
                "source_suffix": "va.gov"
            },
            "stamps": {
                "receipt": { "text": "VA.GOV", "x": 5, "y": 5 },
                "program": { "text": "Reviewed", "x": 429, "y": 770, "text_only": true }
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_upload",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db"
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_provider",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "upload": {
                "provider": "carrier_pigeon",
                "benefits_intake": { "base_url": "https://intake.example.test" }
            }
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "override_to_unconfigured_provider",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "upload": {
                "form_overrides": { "21-4142": "legacy_claims" },
                "benefits_intake": { "base_url": "https://intake.example.test" }
            }
        }"#,
        should_succeed: false,
        expected_error: Some("upload.legacy_claims is missing"),
    },
    ConfigTestCase {
        name: "non_http_base_url",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "upload": { "benefits_intake": { "base_url": "ftp://intake.example.test" } }
        }"#,
        should_succeed: false,
        expected_error: Some("must be an http(s) URL"),
    },
    ConfigTestCase {
        name: "bad_foreign_postal_code",
        config_json: r#"{
            "version": "1.0",
            "scratch_directory": "/tmp/intake",
            "database_path": "/tmp/intake.db",
            "upload": { "benefits_intake": { "base_url": "https://intake.example.test" } },
            "metadata": { "foreign_postal_code": "ABCDE" }
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version: 1.0",
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("{}: expected success, got error: {}", case.name, e),
            (false, Ok(_)) => panic!("{}: expected failure, got success", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    let message = e.to_string();
                    assert!(
                        message.contains(expected),
                        "{}: error '{}' does not contain '{}'",
                        case.name,
                        message,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_defaults_are_applied() {
    let config = load_config_from_str(CONFIG_TESTS[0].config_json).unwrap();

    assert!(config.worker_count >= 1);
    assert_eq!(config.metrics_prefix, "worker.lighthouse.submit_benefits_intake_claim");
    assert_eq!(config.retry.max_retries, 14);
    assert!(config.retry.jitter);
    assert_eq!(config.retry.fixed_delay_secs, None);
    assert_eq!(config.upload.provider, ProviderKind::BenefitsIntake);
    assert_eq!(config.metadata.domestic_country, "USA");
    assert_eq!(config.metadata.foreign_postal_code, "00000");
    assert_eq!(config.stamps.receipt.text, "VA.GOV");
    assert_eq!(config.stamps.program.text, "FDC Reviewed - va.gov Submission");
    assert!(config.stamps.program.text_only);
}

#[test]
fn test_form_override_routes_to_legacy_provider() {
    let config = load_config_from_str(CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(
        config.upload.form_overrides.get("21-4142"),
        Some(&ProviderKind::LegacyClaims)
    );
    assert_eq!(config.retry.fixed_delay_secs, Some(30));
}

#[test]
fn test_load_config_reports_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_config(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
