//! SQLite-backed document store
//!
//! Documents are kept as JSON bodies in a single `documents` table keyed by
//! (collection, id). A partial unique index on (collection, unique_key)
//! enforces secondary keys such as one attendance record per user per day.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{Document, Repository};
use crate::{Error, Result};

/// Schema migrations, applied in order and recorded in `migrations`
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "create_documents",
        r#"CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            unique_key TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )"#,
    ),
    (
        2,
        "documents_unique_key",
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_unique_key
            ON documents (collection, unique_key)
            WHERE unique_key IS NOT NULL"#,
    ),
];

/// Document store over a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and apply migrations
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_path.to_string_lossy().as_ref())?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened document store at {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory database, one connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS migrations (
                version INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                applied_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM migrations")
            .fetch_one(&self.pool)
            .await?;

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            let mut tx = self.pool.begin().await?;
            sqlx::query(*sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO migrations (version, name, applied_at) VALUES (?, ?, ?)")
                .bind(*version)
                .bind(*name)
                .bind(Utc::now().timestamp())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            debug!("Applied migration {} ({})", version, name);
        }
        Ok(())
    }
}

fn decode<D: Document>(body: &str) -> Result<D> {
    serde_json::from_str(body)
        .map_err(|e| Error::Store(format!("corrupt {} document: {}", D::COLLECTION, e)))
}

fn to_i64(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| Error::Store(format!("version overflow: {}", version)))
}

#[async_trait]
impl<D: Document> Repository<D> for SqliteStore {
    async fn create(&self, doc: &D) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO documents (collection, id, unique_key, version, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(D::COLLECTION)
        .bind(doc.id())
        .bind(doc.unique_key())
        .bind(to_i64(doc.version())?)
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(Error::Conflict {
                id: doc.unique_key().unwrap_or_else(|| doc.id().to_string()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<D>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(D::COLLECTION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(decode(&row.try_get::<String, _>("body")?)?)),
            None => Ok(None),
        }
    }

    async fn replace(&self, doc: &mut D) -> Result<()> {
        let expected = doc.version();
        let mut next = doc.clone();
        next.set_version(expected + 1);
        let body = serde_json::to_string(&next)?;

        let result = sqlx::query(
            "UPDATE documents SET body = ?, version = ?, unique_key = ?, updated_at = ?
             WHERE collection = ? AND id = ? AND version = ?",
        )
        .bind(body)
        .bind(to_i64(expected + 1)?)
        .bind(next.unique_key())
        .bind(Utc::now().timestamp())
        .bind(D::COLLECTION)
        .bind(doc.id())
        .bind(to_i64(expected)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM documents WHERE collection = ? AND id = ?")
                    .bind(D::COLLECTION)
                    .bind(doc.id())
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match exists {
                Some(_) => Error::Conflict {
                    id: doc.id().to_string(),
                },
                None => Error::NotFound {
                    kind: D::COLLECTION,
                    id: doc.id().to_string(),
                },
            });
        }

        *doc = next;
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<D>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND unique_key = ?")
            .bind(D::COLLECTION)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(decode(&row.try_get::<String, _>("body")?)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<D>> {
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY created_at")
            .bind(D::COLLECTION)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| decode(&row.try_get::<String, _>("body")?))
            .collect()
    }
}
