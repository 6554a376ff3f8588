use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::filter::{PageWindow, PropertyFilter};
use super::{migrations, seed, QueryExecutor, Session, StoreUnavailable};
use crate::config::DatabaseConfig;
use crate::metrics::DB_QUERIES;
use crate::properties::PropertySummary;

/// SQLite-backed query executor.
///
/// Built once by the embedding application and shut down explicitly;
/// every `list` call borrows one pooled connection for its two queries.
#[derive(Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database url: {}", config.url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // An in-memory database lives only as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        if config.run_migrations {
            migrations::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
        }

        if let Some(seed_file) = &config.seed_file {
            seed::load_seed_file(&pool, Path::new(seed_file)).await?;
        }

        tracing::info!(
            max_connections = config.max_connections,
            "Database pool ready"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool. Later acquisitions fail with `StoreUnavailable`.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn acquire_session(&self) -> Result<Box<dyn Session>, StoreUnavailable> {
        match self.pool.acquire().await {
            Ok(conn) => Ok(Box::new(SqliteSession { conn })),
            Err(e) => {
                tracing::warn!("Failed to acquire database session: {}", e);
                Err(StoreUnavailable::new(e.to_string()))
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl Session for SqliteSession {
    async fn fetch_summaries(
        &mut self,
        filter: &PropertyFilter,
        window: PageWindow,
    ) -> Result<Vec<PropertySummary>> {
        let sql = format!(
            "SELECT id, name, timezone FROM properties WHERE {} ORDER BY name, id LIMIT ? OFFSET ?",
            filter.where_sql()
        );

        let mut query = sqlx::query_as::<_, PropertySummary>(&sql);
        for param in filter.params() {
            query = query.bind(param);
        }

        DB_QUERIES.inc();
        let rows = query
            .bind(window.limit)
            .bind(window.offset)
            .fetch_all(&mut *self.conn)
            .await
            .context("Page query failed")?;

        Ok(rows)
    }

    async fn fetch_count(&mut self, filter: &PropertyFilter) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM properties WHERE {}",
            filter.where_sql()
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for param in filter.params() {
            query = query.bind(param);
        }

        DB_QUERIES.inc();
        let total = query
            .fetch_one(&mut *self.conn)
            .await
            .context("Count query failed")?;

        Ok(u64::try_from(total).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::{insert_properties, SeedProperty};

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_secs: 1,
            run_migrations: true,
            seed_file: None,
        }
    }

    #[tokio::test]
    async fn test_connect_runs_migrations() {
        let executor = SqliteExecutor::connect(&memory_config()).await.unwrap();
        executor.health_check().await.unwrap();

        let mut session = executor.acquire_session().await.unwrap();
        let total = session
            .fetch_count(&PropertyFilter::for_tenant("nobody"))
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_session_orders_by_name() {
        let executor = SqliteExecutor::connect(&memory_config()).await.unwrap();
        insert_properties(
            executor.pool(),
            &[
                SeedProperty::new("t1", "Cedar Lodge"),
                SeedProperty::new("t1", "Aspen Suites"),
                SeedProperty::new("t1", "Birch Inn"),
            ],
        )
        .await
        .unwrap();

        let mut session = executor.acquire_session().await.unwrap();
        let items = session
            .fetch_summaries(
                &PropertyFilter::for_tenant("t1"),
                PageWindow { limit: 10, offset: 0 },
            )
            .await
            .unwrap();

        let names: Vec<_> = items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Aspen Suites", "Birch Inn", "Cedar Lodge"]);
    }

    #[tokio::test]
    async fn test_search_matches_literal_percent() {
        let executor = SqliteExecutor::connect(&memory_config()).await.unwrap();
        insert_properties(
            executor.pool(),
            &[
                SeedProperty::new("t1", "100% Beach"),
                SeedProperty::new("t1", "1000 Pines"),
            ],
        )
        .await
        .unwrap();

        let mut session = executor.acquire_session().await.unwrap();
        let filter = PropertyFilter::for_tenant("t1").with_search(Some("100%"));
        assert_eq!(session.fetch_count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restart_with_seed_file_keeps_total() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.json");
        let mut seed_file = std::fs::File::create(&seed_path).unwrap();
        write!(seed_file, r#"[{{"tenant_id": "t1", "name": "Lakeside"}}]"#).unwrap();

        let config = DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("properties.db").display()),
            seed_file: Some(seed_path.to_string_lossy().to_string()),
            ..memory_config()
        };

        for _ in 0..2 {
            let executor = SqliteExecutor::connect(&config).await.unwrap();
            executor.shutdown().await;
        }

        let executor = SqliteExecutor::connect(&config).await.unwrap();
        let mut session = executor.acquire_session().await.unwrap();
        let total = session
            .fetch_count(&PropertyFilter::for_tenant("t1"))
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let executor = SqliteExecutor::connect(&memory_config()).await.unwrap();
        insert_properties(
            executor.pool(),
            &[
                SeedProperty::new("t1", "ÉTÉ Lodge"),
                SeedProperty::new("t1", "Winter Cabin"),
            ],
        )
        .await
        .unwrap();

        let mut session = executor.acquire_session().await.unwrap();
        let filter = PropertyFilter::for_tenant("t1").with_search(Some("été"));
        assert_eq!(session.fetch_count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acquire_after_shutdown_is_unavailable() {
        let executor = SqliteExecutor::connect(&memory_config()).await.unwrap();
        executor.shutdown().await;

        assert!(executor.acquire_session().await.is_err());
    }
}
