use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreUnavailable;

/// Caller-facing outcome category of a failed listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RejectedRequest,
    ServiceUnavailable,
    InternalError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::RejectedRequest => "rejected",
            Outcome::ServiceUnavailable => "unavailable",
            Outcome::InternalError => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ListError {
    /// The caller carries no tenant.
    #[error("Tenant not found")]
    Authorization,

    #[error("{0}")]
    Validation(String),

    /// No session could be acquired.
    #[error("Database unavailable")]
    Configuration(#[source] StoreUnavailable),

    /// Either query failed. The source is logged, never returned to callers.
    #[error("Failed to load properties")]
    Query(#[source] anyhow::Error),
}

impl ListError {
    pub fn outcome(&self) -> Outcome {
        match self {
            ListError::Authorization | ListError::Validation(_) => Outcome::RejectedRequest,
            ListError::Configuration(_) => Outcome::ServiceUnavailable,
            ListError::Query(_) => Outcome::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ListError::Authorization => StatusCode::BAD_REQUEST,
            ListError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ListError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            ListError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ListError {
    fn into_response(self) -> Response {
        // Display strings carry no internal detail; sources stay server-side.
        let body = Json(json!({ "detail": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}
