//! SQLite-backed [`IndexEngine`].
//!
//! All name spaces, records and aliases live in one database file,
//! `index.sqlite3`, inside the configured index directory. That directory is
//! the snapshot the leader publishes and followers download.
//!
//! Nearest-neighbor queries are brute-force cosine distance over the
//! name space's stored vectors.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use related_index_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use related_index_core::models::{ChunkMetadata, IndexRecord, Neighbor};
use related_index_core::store::IndexEngine;

use crate::db;
use crate::migrate;

/// File name of the index database inside a snapshot directory.
pub const INDEX_FILE: &str = "index.sqlite3";

pub struct SqliteIndex {
    pool: SqlitePool,
    dir: PathBuf,
}

impl SqliteIndex {
    /// Open (creating if needed) the index stored in `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        let pool = db::connect(&dir.join(INDEX_FILE), true).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
        })
    }

    /// Open a downloaded snapshot. Returns `None` when `dir` holds no index file.
    pub async fn open_snapshot(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let pool = db::connect(&path, false).await?;
        Ok(Some(Self {
            pool,
            dir: dir.to_path_buf(),
        }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IndexEngine for SqliteIndex {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT name FROM collections WHERE name = ?")
                .bind(namespace)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            bail!("index namespace not found: {}", namespace);
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, text, formatted_date, timestamp, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    formatted_date = excluded.formatted_date,
                    timestamp = excluded.timestamp,
                    embedding = excluded.embedding
                "#,
            )
            .bind(namespace)
            .bind(&record.id)
            .bind(&record.text)
            .bind(&record.metadata.formatted_date)
            .bind(record.metadata.timestamp)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, namespace: &str, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query("SELECT id, embedding FROM records WHERE collection = ?")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Neighbor {
                    id: row.get("id"),
                    distance: cosine_distance(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn records(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, text, formatted_date, timestamp, embedding
            FROM records
            WHERE collection = ?
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(namespace)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexRecord {
                    id: row.get("id"),
                    text: row.get("text"),
                    metadata: ChunkMetadata {
                        formatted_date: row.get("formatted_date"),
                        timestamp: row.get("timestamp"),
                    },
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM aliases WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        let target: Option<String> =
            sqlx::query_scalar("SELECT collection FROM aliases WHERE alias = ?")
                .bind(alias)
                .fetch_optional(&self.pool)
                .await?;
        Ok(target)
    }

    async fn set_alias(&self, alias: &str, namespace: &str) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT name FROM collections WHERE name = ?")
                .bind(namespace)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            bail!("cannot alias missing namespace: {}", namespace);
        }

        let previous: Option<String> =
            sqlx::query_scalar("SELECT collection FROM aliases WHERE alias = ?")
                .bind(alias)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO aliases (alias, collection) VALUES (?, ?)
            ON CONFLICT(alias) DO UPDATE SET collection = excluded.collection
            "#,
        )
        .bind(alias)
        .bind(namespace)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn checkpoint(&self) -> Result<()> {
        let row = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .fetch_one(&self.pool)
            .await?;
        let busy: i64 = row.get(0);
        let log: i64 = row.get(1);
        let checkpointed: i64 = row.get(2);

        // A reader pinned to an older snapshot keeps frames in the WAL; the
        // main file alone would then miss the latest writes.
        if busy != 0 || log != checkpointed {
            bail!(
                "WAL checkpoint incomplete for {} (busy={}, log={}, checkpointed={})",
                self.db_path().display(),
                busy,
                log,
                checkpointed
            );
        }
        Ok(())
    }

    fn snapshot_dir(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}
