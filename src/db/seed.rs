//! Loads property fixtures into the store.
//!
//! Used for local development (`database.seed_file`) and by tests.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use uuid::Uuid;

use super::filter::fold_case;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProperty {
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl SeedProperty {
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            tenant_id: tenant_id.into(),
            name: name.into(),
            timezone: default_timezone(),
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// The explicit id, or one derived from tenant and name so that
    /// reloading the same fixtures replaces rows instead of adding them.
    pub fn resolved_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                let key = format!("{}\u{0}{}", self.tenant_id, self.name);
                Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
            }
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Inserts or replaces the given properties in one transaction.
pub async fn insert_properties(pool: &SqlitePool, properties: &[SeedProperty]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for property in properties {
        let id = property.resolved_id();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO properties (id, tenant_id, name, name_folded, timezone)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&property.tenant_id)
        .bind(&property.name)
        .bind(fold_case(&property.name))
        .bind(&property.timezone)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert property {}", id))?;
    }

    tx.commit().await?;
    Ok(properties.len())
}

/// Reads a JSON array of properties from `path` and inserts them.
pub async fn load_seed_file(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;

    let properties: Vec<SeedProperty> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))?;

    let inserted = insert_properties(pool, &properties).await?;
    tracing::info!("Seeded {} properties from {}", inserted, path.display());
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;
    use std::io::Write;

    async fn migrated_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_generates_missing_ids() {
        let pool = migrated_pool().await;
        let inserted = insert_properties(
            &pool,
            &[SeedProperty::new("t1", "Alpha"), SeedProperty::new("t1", "Beta")],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 2);

        let row = sqlx::query("SELECT COUNT(DISTINCT id) AS n FROM properties")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 2);
    }

    #[tokio::test]
    async fn test_load_seed_file() {
        let pool = migrated_pool().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "p-1", "tenant_id": "t1", "name": "Harbor View", "timezone": "Europe/Lisbon"}},
                {{"tenant_id": "t2", "name": "Lakeside"}}
            ]"#
        )
        .unwrap();

        let inserted = load_seed_file(&pool, file.path()).await.unwrap();
        assert_eq!(inserted, 2);

        let row = sqlx::query("SELECT timezone FROM properties WHERE id = 'p-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("timezone"), "Europe/Lisbon");
    }

    #[test]
    fn test_resolved_id_is_stable() {
        let a = SeedProperty::new("t1", "Lakeside");
        let b = SeedProperty::new("t1", "Lakeside");
        let other_tenant = SeedProperty::new("t2", "Lakeside");

        assert_eq!(a.resolved_id(), b.resolved_id());
        assert_ne!(a.resolved_id(), other_tenant.resolved_id());
    }

    #[tokio::test]
    async fn test_reloading_seed_file_does_not_duplicate() {
        let pool = migrated_pool().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"tenant_id": "t1", "name": "Lakeside"}}]"#).unwrap();

        for _ in 0..4 {
            load_seed_file(&pool, file.path()).await.unwrap();
        }

        let row = sqlx::query("SELECT COUNT(*) AS n FROM properties WHERE tenant_id = 't1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);
    }

    #[tokio::test]
    async fn test_load_seed_file_rejects_malformed_json() {
        let pool = migrated_pool().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(load_seed_file(&pool, file.path()).await.is_err());
    }
}
