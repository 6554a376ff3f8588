use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

pub mod sources;
pub mod validation;

use sources::{flatten_json, EnvConfigSource, FileConfigSource};
use validation::ConfigValidator;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_VAR: &str = "PROPERTY_LISTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "property-lister.toml";

/// Loads `AppConfig` from layered sources.
///
/// Built-in defaults come first; each source then overrides the keys it
/// sets, in order. The merged result is validated before it is returned.
pub struct ConfigManager {
    sources: Vec<Box<dyn ConfigSource>>,
    validator: ConfigValidator,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Ok(Self::with_sources(vec![
            Box::new(FileConfigSource::new(config_path)?),
            Box::new(EnvConfigSource::new()),
        ]))
    }

    pub fn with_sources(sources: Vec<Box<dyn ConfigSource>>) -> Self {
        Self {
            sources,
            validator: ConfigValidator::new(),
        }
    }

    pub async fn load(&self) -> Result<AppConfig> {
        let mut merged = flatten_json("", &serde_json::to_value(AppConfig::default())?);

        for source in &self.sources {
            let values = source
                .load_config()
                .await
                .with_context(|| format!("Failed to load configuration from {}", source.name()))?;
            tracing::debug!("Loaded {} values from source: {}", values.len(), source.name());
            merged.merge(values);
        }

        let config = AppConfig::try_from(merged)?;
        self.validator.validate(&config)?;
        Ok(config)
    }
}

/// Configuration source trait
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load_config(&self) -> Result<ConfigMap>;
    fn name(&self) -> &str;
}

/// Flattened `section.key` → value map.
pub type ConfigMap = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub auth: AuthConfig,
    #[validate(nested)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// `development` or `production`; production tightens validation.
    #[validate(length(min = 1))]
    pub environment: String,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    pub min_connections: u32,
    #[validate(range(min = 1, max = 300))]
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 1))]
    pub api_key_secret: String,
    #[validate(nested)]
    pub keys: Vec<ApiKeyEntry>,
}

/// Issued API key. `tenant_id` may be omitted for keys not bound to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiKeyEntry {
    #[validate(length(equal = 64))]
    pub key_hash: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    #[validate(length(min = 1))]
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                environment: "development".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            database: DatabaseConfig {
                url: "sqlite:properties.db".to_string(),
                max_connections: 5,
                min_connections: 1,
                acquire_timeout_secs: 5,
                run_migrations: true,
                seed_file: None,
            },
            auth: AuthConfig {
                api_key_secret: "change-this-in-production".to_string(),
                keys: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl TryFrom<ConfigMap> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(config_map: ConfigMap) -> Result<Self> {
        let nested_config = Self::unflatten_config(config_map);

        serde_json::from_value(nested_config).context("Failed to deserialize configuration")
    }
}

impl AppConfig {
    fn unflatten_config(config_map: ConfigMap) -> serde_json::Value {
        let mut nested = serde_json::Map::new();

        for (key, value) in config_map {
            let parts: Vec<&str> = key.split('.').collect();
            Self::insert_nested(&mut nested, &parts, value);
        }

        serde_json::Value::Object(nested)
    }

    fn insert_nested(
        map: &mut serde_json::Map<String, serde_json::Value>,
        parts: &[&str],
        value: serde_json::Value,
    ) {
        let Some((key, remaining)) = parts.split_first() else {
            return;
        };

        if remaining.is_empty() {
            map.insert(key.to_string(), value);
            return;
        }

        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));

        if let serde_json::Value::Object(obj) = entry {
            Self::insert_nested(obj, remaining, value);
        }
    }
}

trait ConfigMapExt {
    fn merge(&mut self, other: ConfigMap);
}

impl ConfigMapExt for ConfigMap {
    fn merge(&mut self, other: ConfigMap) {
        for (key, value) in other {
            self.insert(key, value);
        }
    }
}
