//! Live-index client.
//!
//! Pairs an [`IndexEngine`] with an [`Embedder`] and a stable alias. Writers
//! (builder and synchronizer) fill a fresh staging name space and then
//! [`promote`](IndexClient::promote) it; readers resolve the alias on every
//! query and so only ever see a complete name space.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::embedding::{embed_one, Embedder};
use crate::models::{IndexRecord, IndexedChunk, Neighbor};
use crate::store::IndexEngine;

/// Default number of texts sent to the embedder per call.
pub const DEFAULT_EMBED_BATCH: usize = 64;

pub struct IndexClient {
    engine: Arc<dyn IndexEngine>,
    embedder: Arc<dyn Embedder>,
    alias: String,
    batch_size: usize,
}

impl IndexClient {
    pub fn new(engine: Arc<dyn IndexEngine>, embedder: Arc<dyn Embedder>, alias: &str) -> Self {
        Self {
            engine,
            embedder,
            alias: alias.to_string(),
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn engine(&self) -> &Arc<dyn IndexEngine> {
        &self.engine
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Name for a new staging name space: `<alias>_<yyyymmddHHMMSS>_<8 hex>`.
    pub fn staging_name(&self, now: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", self.alias, now.format("%Y%m%d%H%M%S"), &suffix[..8])
    }

    /// Create an empty staging name space and return its name.
    pub async fn create_staging(&self) -> Result<String> {
        let name = self.staging_name(Utc::now());
        self.engine
            .create_namespace(&name)
            .await
            .with_context(|| format!("Failed to create index namespace {}", name))?;
        Ok(name)
    }

    /// Embed chunks in batches and upsert them into `namespace`.
    ///
    /// Returns the number of records written.
    pub async fn upsert_chunks(&self, namespace: &str, chunks: Vec<IndexedChunk>) -> Result<usize> {
        let mut written = 0usize;
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<IndexedChunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .context("Embedding batch failed")?;
            if vectors.len() != batch.len() {
                bail!(
                    "Embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }

            let records: Vec<IndexRecord> = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector))
                .collect();
            self.engine.upsert(namespace, &records).await?;
            written += records.len();
        }

        Ok(written)
    }

    /// Upsert already-embedded records (used when adopting a snapshot).
    pub async fn upsert_records(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        self.engine.upsert(namespace, records).await
    }

    /// Point the alias at `namespace`, then delete the name space it replaced.
    ///
    /// Returns the replaced name space, if any.
    pub async fn promote(&self, namespace: &str) -> Result<Option<String>> {
        let previous = self
            .engine
            .set_alias(&self.alias, namespace)
            .await
            .with_context(|| format!("Failed to promote {} to {}", namespace, self.alias))?;

        if let Some(old) = previous.as_deref().filter(|old| *old != namespace) {
            if let Err(e) = self.engine.delete_namespace(old).await {
                tracing::warn!(namespace = %old, error = %e, "failed to drop replaced namespace");
            }
        }
        Ok(previous)
    }

    /// Best-effort removal of a staging name space that will not be promoted.
    pub async fn discard(&self, namespace: &str) {
        if let Err(e) = self.engine.delete_namespace(namespace).await {
            tracing::warn!(
                namespace = %namespace,
                error = %e,
                "failed to discard staging namespace"
            );
        }
    }

    /// Drop name spaces under this alias that are not live (left by crashed builds).
    pub async fn prune_orphans(&self) -> Result<usize> {
        let live = self.live_namespace().await?;
        let prefix = format!("{}_", self.alias);
        let mut pruned = 0;
        for name in self.engine.list_namespaces().await? {
            if name.starts_with(&prefix) && live.as_deref() != Some(name.as_str()) {
                self.engine.delete_namespace(&name).await?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    pub async fn live_namespace(&self) -> Result<Option<String>> {
        self.engine.resolve_alias(&self.alias).await
    }

    /// Record count of the live name space (`0` when nothing is live yet).
    pub async fn live_count(&self) -> Result<usize> {
        match self.live_namespace().await? {
            Some(ns) => self.engine.count(&ns).await,
            None => Ok(0),
        }
    }

    /// Embed `text` and return its `k` nearest neighbors in the live index.
    pub async fn query_text(&self, text: &str, k: usize) -> Result<Vec<Neighbor>> {
        let Some(ns) = self.live_namespace().await? else {
            tracing::debug!(alias = %self.alias, "no live index yet");
            return Ok(Vec::new());
        };
        let vector = embed_one(self.embedder.as_ref(), text).await?;
        self.engine.query(&ns, &vector, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use crate::store::memory::InMemoryIndex;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn chunk(id: &str, text: &str) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                formatted_date: "2024-01-01 00:00:00".to_string(),
                timestamp: 0,
            },
        }
    }

    fn client() -> IndexClient {
        IndexClient::new(Arc::new(InMemoryIndex::new()), Arc::new(LengthEmbedder), "posts")
            .with_batch_size(2)
    }

    #[tokio::test]
    async fn staging_names_are_unique_and_prefixed() {
        let c = client();
        let now = Utc::now();
        let a = c.staging_name(now);
        let b = c.staging_name(now);
        assert!(a.starts_with("posts_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn upsert_in_batches_then_promote() {
        let c = client();
        let ns = c.create_staging().await.unwrap();
        let n = c
            .upsert_chunks(&ns, vec![chunk("1", "a"), chunk("2", "bb"), chunk("3", "ccc")])
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(c.live_count().await.unwrap(), 0);

        c.promote(&ns).await.unwrap();
        assert_eq!(c.live_count().await.unwrap(), 3);

        let next = c.create_staging().await.unwrap();
        c.upsert_chunks(&next, vec![chunk("9", "z")]).await.unwrap();
        assert_eq!(c.promote(&next).await.unwrap(), Some(ns.clone()));
        assert_eq!(c.live_count().await.unwrap(), 1);
        assert!(!c.engine().list_namespaces().await.unwrap().contains(&ns));
    }

    #[tokio::test]
    async fn query_without_live_index_is_empty() {
        let c = client();
        assert!(c.query_text("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prune_orphans_keeps_live() {
        let c = client();
        let live = c.create_staging().await.unwrap();
        c.promote(&live).await.unwrap();
        let _orphan = c.create_staging().await.unwrap();
        c.engine().create_namespace("unrelated").await.unwrap();

        assert_eq!(c.prune_orphans().await.unwrap(), 1);
        let names = c.engine().list_namespaces().await.unwrap();
        assert!(names.contains(&live));
        assert!(names.contains(&"unrelated".to_string()));
    }
}
