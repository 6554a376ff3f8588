use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::Response,
};

use crate::auth::{unauthorized, Principal};

/// Tenant scope of the current request, taken from the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Option<String>,
    pub key_id: String,
}

impl From<&Principal> for TenantContext {
    fn from(principal: &Principal) -> Self {
        Self {
            tenant_id: principal.tenant_id.clone(),
            key_id: principal.key_id.clone(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Absent only when the route skipped the auth middleware.
        parts
            .extensions
            .get::<Principal>()
            .map(TenantContext::from)
            .ok_or_else(unauthorized)
    }
}
