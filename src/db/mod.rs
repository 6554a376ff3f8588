pub mod filter;
pub mod migrations;
pub mod seed;
pub mod sqlite;

pub use filter::{Clause, PageWindow, PropertyFilter};
pub use sqlite::SqliteExecutor;

use async_trait::async_trait;
use thiserror::Error;

use crate::properties::PropertySummary;

/// No session could be handed out by the executor.
#[derive(Debug, Error)]
#[error("data store unavailable: {reason}")]
pub struct StoreUnavailable {
    pub reason: String,
}

impl StoreUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Source of read sessions against the relational store.
///
/// Implementations own their pool lifecycle and timeout policy.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn acquire_session(&self) -> Result<Box<dyn Session>, StoreUnavailable>;

    /// Round-trip check used by readiness probes.
    async fn health_check(&self) -> anyhow::Result<()>;
}

/// One scoped connection. Dropping it releases the connection.
#[async_trait]
pub trait Session: Send {
    async fn fetch_summaries(
        &mut self,
        filter: &PropertyFilter,
        window: PageWindow,
    ) -> anyhow::Result<Vec<PropertySummary>>;

    async fn fetch_count(&mut self, filter: &PropertyFilter) -> anyhow::Result<u64>;
}
