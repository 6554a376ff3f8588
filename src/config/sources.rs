use super::{ConfigMap, ConfigSource, CONFIG_PATH_VAR};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::env;
use std::path::Path;
use tokio::fs;

/// Environment variable configuration source.
///
/// `PROPERTY_LISTER_DATABASE__URL` maps to `database.url`: the prefix is
/// stripped, the rest lowercased, and `__` separates nesting levels.
pub struct EnvConfigSource {
    prefix: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self {
            prefix: "PROPERTY_LISTER_".to_string(),
            vars: None,
        }
    }

    /// Reads from a fixed set of variables instead of the process environment.
    pub fn from_vars(prefix: impl Into<String>, vars: Vec<(String, String)>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: Some(vars),
        }
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for EnvConfigSource {
    async fn load_config(&self) -> Result<ConfigMap> {
        let vars = match &self.vars {
            Some(vars) => vars.clone(),
            None => env::vars().collect(),
        };

        let mut config = ConfigMap::new();

        for (key, value) in &vars {
            if key == CONFIG_PATH_VAR {
                continue;
            }
            if let Some(stripped) = key.strip_prefix(&self.prefix) {
                let config_key = stripped.to_lowercase().replace("__", ".");
                config.insert(config_key, parse_value(value));
            }
        }

        // Conventional names, applied last so they win over prefixed ones.
        for (key, value) in &vars {
            let config_key = match key.as_str() {
                "PORT" => "server.port",
                "DATABASE_URL" => "database.url",
                "API_KEY_SECRET" => "auth.api_key_secret",
                _ => continue,
            };
            config.insert(config_key.to_string(), parse_value(value));
        }

        tracing::debug!("Loaded {} configuration values from environment", config.len());
        Ok(config)
    }

    fn name(&self) -> &str {
        "environment"
    }
}

/// Try to parse as JSON first, then fall back to string.
fn parse_value(value: &str) -> serde_json::Value {
    serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}

/// File-based configuration source (TOML or JSON). A missing file yields no values.
pub struct FileConfigSource {
    file_path: String,
}

impl FileConfigSource {
    pub fn new(file_path: impl Into<String>) -> Result<Self> {
        let file_path = file_path.into();
        if !file_path.ends_with(".toml") && !file_path.ends_with(".json") {
            return Err(anyhow::anyhow!("Unsupported config file format: {}", file_path));
        }
        Ok(Self { file_path })
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load_config(&self) -> Result<ConfigMap> {
        if !Path::new(&self.file_path).exists() {
            tracing::debug!("Configuration file {} does not exist", self.file_path);
            return Ok(ConfigMap::new());
        }

        let content = fs::read_to_string(&self.file_path)
            .await
            .with_context(|| format!("Failed to read config file: {}", self.file_path))?;

        let json_value: serde_json::Value = if self.file_path.ends_with(".toml") {
            let toml_value: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", self.file_path))?;
            serde_json::to_value(toml_value)?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", self.file_path))?
        };

        let config = flatten_json("", &json_value);
        tracing::debug!(
            "Loaded {} configuration values from file: {}",
            config.len(),
            self.file_path
        );
        Ok(config)
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Flattens nested objects into dotted keys. Arrays and scalars are leaves.
pub fn flatten_json(prefix: &str, value: &serde_json::Value) -> ConfigMap {
    let mut config = ConfigMap::new();

    match value {
        serde_json::Value::Object(object) => {
            for (key, val) in object {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                config.extend(flatten_json(&new_prefix, val));
            }
        }
        _ => {
            config.insert(prefix.to_string(), value.clone());
        }
    }

    config
}
