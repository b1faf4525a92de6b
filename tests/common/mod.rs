//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use related_index::content::SqlContentSource;
use related_index::fs_objects::FsObjectStore;
use related_index::mirror::ObjectMirror;
use related_index::sqlite_index::SqliteIndex;
use related_index_core::embedding::Embedder;
use related_index_core::index_client::IndexClient;

pub const DIMS: usize = 256;

/// Deterministic bag-of-words embedder: each word hashes (FNV-1a) into one of
/// `DIMS` buckets, so texts sharing words have a small cosine distance.
pub struct BagOfWords;

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split_whitespace() {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Embedder that always fails, standing in for an unreachable provider.
pub struct Unavailable;

#[async_trait]
impl Embedder for Unavailable {
    fn model_name(&self) -> &str {
        "unavailable"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding provider unreachable")
    }
}

pub const ALIAS: &str = "embedded_posts";

pub const POSTS: &[(i64, &str, &str, i64)] = &[
    (1, "<p>Red sports car driving fast on the highway</p>", "publish", 1_700_000_000),
    (2, "Blue sports car parked on the highway at night", "publish", 1_700_000_100),
    (3, "Chocolate cake recipe with vanilla frosting", "publish", 1_700_000_200),
    (4, "<p></p>", "publish", 1_700_000_300),
    (5, "Unpublished draft about sports cars", "draft", 1_700_000_400),
];

/// Every published post, with post 1 listed twice.
pub const ELIGIBLE_QUERY: &str = "\
SELECT CAST(ID AS TEXT) AS id, post_content AS body, published_at \
FROM wp_posts WHERE post_status = 'publish' \
UNION ALL \
SELECT CAST(ID AS TEXT) AS id, post_content AS body, published_at \
FROM wp_posts WHERE ID = 1";

pub const NO_POSTS_QUERY: &str = "\
SELECT CAST(ID AS TEXT) AS id, post_content AS body, published_at \
FROM wp_posts WHERE post_status = 'trash'";

/// A SQLite blog database seeded with [`POSTS`].
pub async fn content_source(dir: &Path, eligible_query: &str) -> Arc<SqlContentSource> {
    let config = related_index::config::ContentConfig {
        url: format!("sqlite://{}?mode=rwc", dir.join("blog.db").display()),
        eligible_query: eligible_query.to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let source = SqlContentSource::connect(&config).await.unwrap();

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS wp_posts (ID INTEGER PRIMARY KEY, post_content TEXT, \
         post_status TEXT NOT NULL, published_at INTEGER NOT NULL)",
    )
    .execute(source.pool())
    .await
    .unwrap();
    for (id, body, status, ts) in POSTS {
        sqlx::query(
            "INSERT OR REPLACE INTO wp_posts (ID, post_content, post_status, published_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(*id)
        .bind(*body)
        .bind(*status)
        .bind(*ts)
        .execute(source.pool())
        .await
        .unwrap();
    }
    Arc::new(source)
}

pub async fn index_client(dir: &Path, embedder: Arc<dyn Embedder>) -> Arc<IndexClient> {
    let engine = SqliteIndex::open(dir).await.unwrap();
    Arc::new(IndexClient::new(Arc::new(engine), embedder, ALIAS).with_batch_size(2))
}

pub fn mirror(bucket: &Path) -> Arc<ObjectMirror> {
    Arc::new(ObjectMirror::new(Arc::new(FsObjectStore::new(bucket)), "index/").unwrap())
}
