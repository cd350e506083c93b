use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{Config, EndpointConfig, ProviderKind};
use crate::error::ConfigError;
use crate::secrets::resolve_secret_optional;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    validate_endpoint("benefits_intake", &config.upload.benefits_intake)?;
    if let Some(legacy) = &config.upload.legacy_claims {
        validate_endpoint("legacy_claims", legacy)?;
    }

    // Every provider a claim can be routed to must be configured.
    let routed = std::iter::once(config.upload.provider)
        .chain(config.upload.form_overrides.values().copied());
    for kind in routed {
        if kind == ProviderKind::LegacyClaims && config.upload.legacy_claims.is_none() {
            return Err(ConfigError::Validation {
                message: "legacy_claims provider is selected but upload.legacy_claims is missing"
                    .to_string(),
            });
        }
    }

    for (name, stamp) in [
        ("receipt", &config.stamps.receipt),
        ("program", &config.stamps.program),
    ] {
        if stamp.text.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("stamps.{} has empty text", name),
            });
        }
    }

    Ok(())
}

fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
    let base = endpoint.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("upload.{}.base_url must be an http(s) URL", name),
        });
    }
    if endpoint.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: format!("upload.{}.timeout_secs must be positive", name),
        });
    }
    Ok(())
}

/// Resolves the API key for an endpoint. Endpoints without any key source
/// are called unauthenticated.
pub fn resolve_api_key(
    name: &str,
    endpoint: &EndpointConfig,
) -> Result<Option<SecretString>, ConfigError> {
    resolve_secret_optional(
        endpoint.api_key.as_deref(),
        endpoint.api_key_file.as_deref(),
        endpoint.api_key_env.as_deref(),
    )
    .map_err(|e| ConfigError::Secret {
        name: name.to_string(),
        source: e,
    })
}
