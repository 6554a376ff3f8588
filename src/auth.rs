use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use blake3::Hasher;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AuthConfig;

/// Minimum accepted API key length.
pub const MIN_API_KEY_LEN: usize = 32;

/// Authenticated caller. `tenant_id` is `None` for keys issued without a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub key_id: String,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingCredentials,
    #[error("API key validation failed")]
    InvalidCredentials,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

/// Bearer API keys, stored as keyed BLAKE3 hashes.
pub struct ApiKeyAuthenticator {
    secret: String,
    keys: HashMap<String, Option<String>>,
}

impl ApiKeyAuthenticator {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            keys: HashMap::new(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let mut authenticator = Self::new(config.api_key_secret.clone());
        for entry in &config.keys {
            authenticator.register_key_hash(entry.key_hash.to_lowercase(), entry.tenant_id.clone());
        }
        tracing::info!("Loaded {} API keys", authenticator.keys.len());
        authenticator
    }

    pub fn register_key_hash(&mut self, key_hash: String, tenant_id: Option<String>) {
        self.keys.insert(key_hash, tenant_id);
    }

    /// Registers a plaintext key. Only the hash is kept.
    pub fn register_key(&mut self, api_key: &str, tenant_id: Option<String>) {
        let key_hash = self.hash_api_key(api_key);
        self.register_key_hash(key_hash, tenant_id);
    }

    pub fn validate_key(&self, api_key: &str) -> Option<Principal> {
        if api_key.len() < MIN_API_KEY_LEN {
            return None;
        }

        let key_hash = self.hash_api_key(api_key);
        self.keys.get(&key_hash).map(|tenant_id| Principal {
            key_id: key_hash[..12].to_string(),
            tenant_id: tenant_id.clone(),
        })
    }

    pub fn hash_api_key(&self, api_key: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(api_key.as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        let api_key = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or(AuthError::MissingCredentials)?;

        self.validate_key(api_key).ok_or(AuthError::InvalidCredentials)
    }
}

pub type AuthState = Arc<dyn Authenticator>;

pub async fn auth_middleware(
    State(authenticator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticator.authenticate(request.headers()).await {
        Ok(principal) => {
            tracing::debug!(key_id = %principal.key_id, "API key validation successful");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!("{}", e);
            unauthorized()
        }
    }
}

pub fn unauthorized() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "pl_1234567890abcdef1234567890abcdef";

    fn authenticator() -> ApiKeyAuthenticator {
        let mut auth = ApiKeyAuthenticator::new("test-secret".to_string());
        auth.register_key(KEY, Some("tenant-a".to_string()));
        auth
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_hash_depends_on_secret() {
        let a = ApiKeyAuthenticator::new("secret-one".to_string());
        let b = ApiKeyAuthenticator::new("secret-two".to_string());
        assert_eq!(a.hash_api_key(KEY), a.hash_api_key(KEY));
        assert_ne!(a.hash_api_key(KEY), b.hash_api_key(KEY));
        assert_eq!(a.hash_api_key(KEY).len(), 64);
    }

    #[test]
    fn test_short_keys_are_rejected() {
        let mut auth = ApiKeyAuthenticator::new("s".to_string());
        auth.register_key("short", Some("t".to_string()));
        assert!(auth.validate_key("short").is_none());
    }

    #[tokio::test]
    async fn test_valid_key_yields_tenant() {
        let principal = authenticator()
            .authenticate(&bearer(&format!("Bearer {}", KEY)))
            .await
            .unwrap();
        assert_eq!(principal.tenant_id.as_deref(), Some("tenant-a"));
        assert_eq!(principal.key_id.len(), 12);
    }

    #[tokio::test]
    async fn test_missing_header_is_rejected() {
        let err = authenticator()
            .authenticate(&HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials);

        let err = authenticator()
            .authenticate(&bearer(&format!("Basic {}", KEY)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials);
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let err = authenticator()
            .authenticate(&bearer("Bearer pl_ffffffffffffffffffffffffffffffff"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_key_without_tenant() {
        let mut auth = authenticator();
        let other = "pl_00000000000000000000000000000000";
        auth.register_key(other, None);

        let principal = auth
            .authenticate(&bearer(&format!("Bearer {}", other)))
            .await
            .unwrap();
        assert!(principal.tenant_id.is_none());
    }
}
