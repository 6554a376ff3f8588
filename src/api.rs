use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{auth_middleware, AuthState};
use crate::health::{create_health_routes, HealthCheckManager};
use crate::metrics::create_metrics_router;
use crate::properties::{api::create_property_routes, PropertyLister};

#[derive(Clone)]
pub struct AppState {
    pub lister: PropertyLister,
    pub authenticator: AuthState,
    pub health: Arc<HealthCheckManager>,
}

impl AppState {
    pub fn new(lister: PropertyLister, authenticator: AuthState) -> Self {
        let health = Arc::new(HealthCheckManager::new(lister.executor().clone()));
        Self {
            lister,
            authenticator,
            health,
        }
    }
}

/// Authenticated listing API under `/api/v1`, plus unauthenticated health and metrics.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let api = create_property_routes()
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            auth_middleware,
        ))
        .with_state(state.lister.clone());

    Router::new()
        .nest("/api/v1", api)
        .merge(create_health_routes().with_state(state.health.clone()))
        .merge(create_metrics_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}
