use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::db::QueryExecutor;

const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
/// Reported in place of the underlying error; readiness is unauthenticated.
const DATABASE_UNAVAILABLE: &str = "Database unavailable";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: ServiceStatus,
    pub latency_ms: Option<u64>,
    pub last_check: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyHealth>,
    pub startup_time: DateTime<Utc>,
}

pub struct HealthCheckManager {
    executor: Arc<dyn QueryExecutor>,
    startup_time: Instant,
    startup_timestamp: DateTime<Utc>,
}

impl HealthCheckManager {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            startup_time: Instant::now(),
            startup_timestamp: Utc::now(),
        }
    }

    pub async fn check(&self) -> HealthStatus {
        let database = self.check_database().await;
        let status = database.status.clone();

        let mut dependencies = HashMap::new();
        dependencies.insert("database".to_string(), database);

        HealthStatus {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.startup_time.elapsed().as_secs(),
            dependencies,
            startup_time: self.startup_timestamp,
        }
    }

    async fn check_database(&self) -> DependencyHealth {
        let start_time = Instant::now();

        let (status, latency_ms, error_message) =
            match timeout(DATABASE_CHECK_TIMEOUT, self.executor.health_check()).await {
                Ok(Ok(())) => {
                    let latency = start_time.elapsed().as_millis() as u64;
                    tracing::debug!("Database health check passed in {}ms", latency);
                    (ServiceStatus::Healthy, Some(latency), None)
                }
                Ok(Err(e)) => {
                    tracing::error!("Database health check failed: {:#}", e);
                    (
                        ServiceStatus::Unhealthy,
                        None,
                        Some(DATABASE_UNAVAILABLE.to_string()),
                    )
                }
                Err(_) => {
                    tracing::error!(
                        "Database health check timed out after {} seconds",
                        DATABASE_CHECK_TIMEOUT.as_secs()
                    );
                    (
                        ServiceStatus::Unhealthy,
                        None,
                        Some("Health check timed out".to_string()),
                    )
                }
            };

        DependencyHealth {
            name: "database".to_string(),
            status,
            latency_ms,
            last_check: Utc::now(),
            error_message,
        }
    }

    /// Whether the service can take traffic (readiness probe).
    pub async fn is_ready(&self) -> bool {
        self.check().await.status == ServiceStatus::Healthy
    }
}

pub fn create_health_routes() -> Router<Arc<HealthCheckManager>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(
    State(manager): State<Arc<HealthCheckManager>>,
) -> (StatusCode, Json<HealthStatus>) {
    let status = manager.check().await;
    let code = match status.status {
        ServiceStatus::Healthy => StatusCode::OK,
        ServiceStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(status))
}
