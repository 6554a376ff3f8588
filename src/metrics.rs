use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use axum::{
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

// Global metrics
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    registry.register(Box::new(LIST_REQUESTS.clone())).unwrap();
    registry.register(Box::new(LIST_DURATION.clone())).unwrap();
    registry.register(Box::new(DB_QUERIES.clone())).unwrap();

    registry
});

/// Listing calls by outcome: `ok`, `rejected`, `unavailable`, `error`.
pub static LIST_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("property_list_requests_total", "Total number of property listing calls"),
        &["outcome"],
    )
    .expect("metric can be created")
});

pub static LIST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "property_list_duration_seconds",
            "Property listing duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric can be created")
});

pub static DB_QUERIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("property_db_queries_total", "Total number of data store queries")
        .expect("metric can be created")
});

pub fn create_metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> Result<Response<String>, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => Response::builder()
            .status(200)
            .header("content-type", "text/plain; version=0.0.4")
            .body(output)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
