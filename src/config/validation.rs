use super::AppConfig;
use anyhow::{Context, Result};
use validator::Validate;

use crate::auth::MIN_API_KEY_LEN;

const DEFAULT_SECRETS: &[&str] = &["change-this-in-production", ""];

/// Configuration validator: derive rules first, then cross-field checks.
pub struct ConfigValidator {
    validators: Vec<Box<dyn CustomValidator>>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            validators: vec![
                Box::new(SecurityValidator),
                Box::new(DatabaseValidator),
                Box::new(LoggingValidator),
            ],
        }
    }

    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        config
            .validate()
            .context("Configuration validation failed")?;

        for validator in &self.validators {
            validator
                .validate(config)
                .with_context(|| format!("{} configuration is invalid", validator.name()))?;
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom validator trait
pub trait CustomValidator: Send + Sync {
    fn validate(&self, config: &AppConfig) -> Result<()>;
    fn name(&self) -> &str;
}

/// API key secret strength and key table sanity.
pub struct SecurityValidator;

impl CustomValidator for SecurityValidator {
    fn validate(&self, config: &AppConfig) -> Result<()> {
        let secret = &config.auth.api_key_secret;
        let weak = secret.len() < MIN_API_KEY_LEN || DEFAULT_SECRETS.contains(&secret.as_str());

        if weak {
            if config.server.is_production() {
                return Err(anyhow::anyhow!(
                    "auth.api_key_secret must be changed and at least {} characters long in production",
                    MIN_API_KEY_LEN
                ));
            }
            tracing::warn!("Using a weak auth.api_key_secret - change this in production!");
        }

        if config
            .auth
            .keys
            .iter()
            .any(|k| !k.key_hash.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(anyhow::anyhow!("auth.keys entries must be hex-encoded hashes"));
        }

        if config.auth.keys.is_empty() {
            tracing::warn!("No API keys configured; every listing request will be rejected");
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "security"
    }
}

/// Connection URL scheme and pool sizing.
pub struct DatabaseValidator;

impl CustomValidator for DatabaseValidator {
    fn validate(&self, config: &AppConfig) -> Result<()> {
        let db = &config.database;

        if !db.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "database.url must start with sqlite:, got: {}",
                db.url
            ));
        }

        if db.min_connections > db.max_connections {
            return Err(anyhow::anyhow!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                db.min_connections,
                db.max_connections
            ));
        }

        if db.url.contains(":memory:") && db.max_connections > 1 {
            tracing::warn!(
                "In-memory database with {} connections: each connection sees its own database",
                db.max_connections
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "database"
    }
}

pub struct LoggingValidator;

impl CustomValidator for LoggingValidator {
    fn validate(&self, config: &AppConfig) -> Result<()> {
        tracing_subscriber::EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("Invalid logging.level: {}", config.logging.level))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
