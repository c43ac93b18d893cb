//! Payment provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Payment provider configuration (webhook side).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Webhook signing secret from the provider dashboard.
    pub webhook_secret: SecretString,
}

impl ProviderConfig {
    /// Validate provider configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER__WEBHOOK_SECRET"));
        }
        if !self.webhook_secret.expose_secret().starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_fails_validation() {
        let config = ProviderConfig {
            webhook_secret: SecretString::new(String::new()),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn wrong_prefix_fails_validation() {
        let config = ProviderConfig {
            webhook_secret: SecretString::new("sk_test_xxx".to_string()),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn whsec_prefixed_secret_passes() {
        let config = ProviderConfig {
            webhook_secret: SecretString::new("whsec_xxx".to_string()),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let config = ProviderConfig {
            webhook_secret: SecretString::new("whsec_super_secret".to_string()),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("whsec_super_secret"));
    }
}
