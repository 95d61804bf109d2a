//! Opening the settlement database and bringing its schema up to date.
//!
//! The schema version lives in `PRAGMA user_version`; a database already at
//! [`SCHEMA_VERSION`] is left alone, anything older gets `schema.sql`
//! applied inside one transaction.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// Version stamped into `user_version` once `schema.sql` is applied.
pub const SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open (creating if needed) the database at `db_path` and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { set_pragmas(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    let version = apply_schema(&pool).await?;
    info!(path = db_path, schema_version = version, "settlement database ready");
    Ok(pool)
}

async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("PRAGMA user_version").fetch_one(pool).await?;
    Ok(row.get(0))
}

/// Create the settlement, snapshot and pool config tables unless the
/// database is already current. Returns the resulting schema version.
async fn apply_schema(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let found = schema_version(pool).await?;
    if found >= SCHEMA_VERSION {
        debug!(version = found, "settlement schema current");
        return Ok(found);
    }

    info!(from = found, to = SCHEMA_VERSION, "applying settlement schema");
    let mut tx = pool.begin().await?;
    for statement in include_str!("schema.sql").split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
    }
    // PRAGMA takes no bound parameters
    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(SCHEMA_VERSION)
}

/// Per-connection settings: foreign keys, WAL, busy timeout, NORMAL sync.
async fn set_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode answers with the mode actually in effect
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);

    sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    debug!(journal_mode = %journal_mode, busy_timeout_ms = BUSY_TIMEOUT_MS, "connection configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> String {
        dir.path()
            .join("nested")
            .join("settlement.db")
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_init_creates_file_and_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);

        let pool = init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());
        assert_eq!(schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_schema_tables_and_index() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        for (kind, name) in [
            ("table", "settlements"),
            ("table", "state_snapshots"),
            ("table", "pool_configs"),
            ("index", "idx_settlements_digest"),
        ] {
            let found: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type = ? AND name = ?")
                    .bind(kind)
                    .bind(name)
                    .fetch_one(&pool)
                    .await
                    .expect("query failed");
            assert_eq!(found.0, name);
        }
    }

    #[tokio::test]
    async fn test_current_schema_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        sqlx::query(
            "INSERT INTO pool_configs (version, created_at, entries_json) VALUES (7, 'now', '[]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(apply_schema(&pool).await.unwrap(), SCHEMA_VERSION);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pool_configs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        {
            let pool = init_db(&path).await.expect("init_db failed");
            sqlx::query(
                "INSERT INTO state_snapshots (epoch, reason, created_at, state_json, venue_json) \
                 VALUES (3, 'bundle', 'now', '{}', '{}')",
            )
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;
        }

        let pool = init_db(&path).await.expect("reopen failed");
        let epoch: (i64,) = sqlx::query_as("SELECT epoch FROM state_snapshots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(epoch.0, 3);
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        let foreign_keys: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys.0, 1);

        let busy: (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(busy.0, i64::from(BUSY_TIMEOUT_MS));

        // WAL is not available on every filesystem
        let journal: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(matches!(journal.0.as_str(), "wal" | "delete"), "{}", journal.0);
    }
}
