//! Versioned schema migrations for the property store.

use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{Row, Transaction};

use super::filter::fold_case;

/// Current database schema version
const SCHEMA_VERSION: i32 = 3;

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

const MIGRATION_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_properties_tenant_name ON properties (tenant_id, name)
"#;

const MIGRATION_V3_COLUMN: &str = r#"
ALTER TABLE properties ADD COLUMN name_folded TEXT NOT NULL DEFAULT ''
"#;

const MIGRATION_V3_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_properties_tenant_name_folded ON properties (tenant_id, name_folded)
"#;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = current_version(pool).await?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            run_migration(pool, version).await?;
        }
        tracing::info!("Database migrations completed successfully");
    }

    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let row = sqlx::query("SELECT MAX(version) AS version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row
        .and_then(|row| row.try_get::<Option<i32>, _>("version").ok().flatten())
        .unwrap_or(0))
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let (name, statements): (&str, &[&str]) = match version {
        1 => ("create_properties", &[MIGRATION_V1]),
        2 => ("index_properties_tenant_name", &[MIGRATION_V2]),
        3 => (
            "add_properties_name_folded",
            &[MIGRATION_V3_COLUMN, MIGRATION_V3_INDEX],
        ),
        _ => return Ok(()),
    };

    let mut tx = pool.begin().await?;
    for sql in statements {
        sqlx::query(sql).execute(&mut *tx).await?;
    }
    if version == 3 {
        backfill_folded_names(&mut tx).await?;
    }
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::debug!(version, name, "Applied migration");
    Ok(())
}

/// Fills `name_folded` for rows written before the column existed.
async fn backfill_folded_names(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
    let rows = sqlx::query("SELECT id, name FROM properties")
        .fetch_all(&mut **tx)
        .await?;

    for row in rows {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        sqlx::query("UPDATE properties SET name_folded = ? WHERE id = ?")
            .bind(fold_case(&name))
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_create_properties_table() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM properties")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 0);
        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), SCHEMA_VERSION as i64);
    }

    #[tokio::test]
    async fn test_folded_names_are_backfilled() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL DEFAULT (datetime('now')))")
            .execute(&pool)
            .await
            .unwrap();
        for version in 1..=2 {
            run_migration(&pool, version).await.unwrap();
        }
        sqlx::query("INSERT INTO properties (id, tenant_id, name) VALUES ('p-1', 't1', 'ÉTÉ Lodge')")
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();

        let row = sqlx::query("SELECT name_folded FROM properties WHERE id = 'p-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("name_folded"), "été lodge");
        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }
}
