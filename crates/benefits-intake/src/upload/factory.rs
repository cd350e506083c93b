use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{BenefitsIntakeProvider, HttpTransport, LegacyClaimsProvider, UploadProvider, UploadTransport};
use crate::claim::Claim;
use crate::config::{resolve_api_key, EndpointConfig, ProviderKind, UploadConfig};
use crate::error::{ConfigError, UploadError};

/// Picks the provider for a claim from configuration and builds it.
pub struct ProviderFactory {
    default: ProviderKind,
    form_overrides: HashMap<String, ProviderKind>,
    transports: HashMap<ProviderKind, Arc<dyn UploadTransport>>,
}

impl ProviderFactory {
    pub fn new(default: ProviderKind) -> Self {
        Self {
            default,
            form_overrides: HashMap::new(),
            transports: HashMap::new(),
        }
    }

    pub fn with_transport(mut self, kind: ProviderKind, transport: Arc<dyn UploadTransport>) -> Self {
        self.transports.insert(kind, transport);
        self
    }

    pub fn with_override(mut self, form_id: impl Into<String>, kind: ProviderKind) -> Self {
        self.form_overrides.insert(form_id.into(), kind);
        self
    }

    /// Builds HTTP transports for every configured endpoint.
    pub fn from_config(config: &UploadConfig) -> Result<Self, ConfigError> {
        let mut factory = Self::new(config.provider);
        factory.form_overrides = config.form_overrides.clone();

        factory = factory.with_transport(
            ProviderKind::BenefitsIntake,
            http_transport(ProviderKind::BenefitsIntake, &config.benefits_intake)?,
        );
        if let Some(legacy) = &config.legacy_claims {
            factory = factory.with_transport(
                ProviderKind::LegacyClaims,
                http_transport(ProviderKind::LegacyClaims, legacy)?,
            );
        }
        Ok(factory)
    }

    pub fn kind_for(&self, form_id: &str) -> ProviderKind {
        self.form_overrides
            .get(form_id)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn provider_for(&self, claim: &Claim) -> Result<Box<dyn UploadProvider>, UploadError> {
        let kind = self.kind_for(&claim.form_id);
        let transport = self.transports.get(&kind).cloned().ok_or_else(|| {
            UploadError::Transport(format!("no transport configured for {}", kind.as_str()))
        })?;

        Ok(match kind {
            ProviderKind::BenefitsIntake => Box::new(BenefitsIntakeProvider::new(transport)),
            ProviderKind::LegacyClaims => Box::new(LegacyClaimsProvider::new(
                transport,
                claim.submitted_claim_id.clone(),
            )),
        })
    }
}

fn http_transport(
    kind: ProviderKind,
    endpoint: &EndpointConfig,
) -> Result<Arc<dyn UploadTransport>, ConfigError> {
    let api_key = resolve_api_key(kind.as_str(), endpoint)?;
    let transport = HttpTransport::new(
        endpoint.base_url.clone(),
        endpoint.session_path.clone(),
        endpoint.upload_path.clone(),
        api_key,
        Duration::from_secs(endpoint.timeout_secs),
    )
    .map_err(|e| ConfigError::Validation {
        message: format!("upload.{}: {}", kind.as_str(), e),
    })?;
    Ok(Arc::new(transport))
}
