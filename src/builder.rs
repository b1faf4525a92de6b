//! Leader rebuild and publish.
//!
//! One cycle reads every eligible document, rebuilds the index into a fresh
//! staging name space, promotes it through the alias and publishes the
//! engine's snapshot directory to the mirror:
//!
//! ```text
//! list → dedup/order → prepare → purge mirror → settle → embed + upsert
//!      → promote alias → checkpoint → push snapshot
//! ```
//!
//! A failure before promotion leaves the previously live name space serving.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use related_index_core::index_client::IndexClient;
use related_index_core::models::IndexedChunk;
use related_index_core::preprocess::prepare;
use related_index_core::source::{dedup_and_order, ContentSource};

use crate::mirror::ObjectMirror;

/// Summary of one rebuild cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Rows returned by the eligible-documents query.
    pub fetched: usize,
    pub duplicates: usize,
    /// Documents with no indexable text after normalization.
    pub skipped_empty: usize,
    pub indexed: usize,
    /// Objects written to the mirror.
    pub published: usize,
}

pub struct IndexBuilder {
    source: Arc<dyn ContentSource>,
    index: Arc<IndexClient>,
    mirror: Arc<ObjectMirror>,
    chunk_chars: usize,
    purge_settle: Duration,
}

impl IndexBuilder {
    pub fn new(
        source: Arc<dyn ContentSource>,
        index: Arc<IndexClient>,
        mirror: Arc<ObjectMirror>,
        chunk_chars: usize,
        purge_settle: Duration,
    ) -> Self {
        Self {
            source,
            index,
            mirror,
            chunk_chars,
            purge_settle,
        }
    }

    /// Run one full rebuild cycle.
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let documents = self
            .source
            .list_eligible_documents()
            .await
            .context("Failed to list eligible documents")?;
        let fetched = documents.len();
        let (documents, duplicates) = dedup_and_order(documents);

        let chunks: Vec<IndexedChunk> = documents
            .iter()
            .filter_map(|d| prepare(d, self.chunk_chars))
            .collect();
        let mut report = BuildReport {
            fetched,
            duplicates,
            skipped_empty: documents.len() - chunks.len(),
            ..Default::default()
        };
        tracing::info!(
            fetched,
            duplicates,
            skipped_empty = report.skipped_empty,
            chunks = chunks.len(),
            "prepared documents for rebuild"
        );

        if chunks.is_empty() {
            tracing::warn!("no indexable documents; leaving index and mirror untouched");
            return Ok(report);
        }

        self.clear_mirror().await;

        match self.index.prune_orphans().await {
            Ok(0) => {}
            Ok(pruned) => tracing::info!(pruned, "dropped orphaned namespaces"),
            Err(e) => tracing::warn!(error = %e, "failed to prune orphaned namespaces"),
        }

        report.indexed = self.build_and_promote(chunks).await?;

        if self.index.live_count().await? > 0 {
            report.published = self.publish().await?;
        }

        tracing::info!(
            indexed = report.indexed,
            published = report.published,
            "rebuild complete"
        );
        Ok(report)
    }

    /// Purge the mirror prefix, then wait for the store to settle.
    async fn clear_mirror(&self) {
        match self.mirror.purge_prefix().await {
            Ok(purged) => tracing::info!(purged, prefix = %self.mirror.prefix(), "purged mirror"),
            Err(e) => tracing::warn!(error = %e, "mirror purge failed; continuing"),
        }
        if !self.purge_settle.is_zero() {
            tracing::debug!(secs = self.purge_settle.as_secs(), "waiting for mirror to settle");
            tokio::time::sleep(self.purge_settle).await;
        }
    }

    async fn build_and_promote(&self, chunks: Vec<IndexedChunk>) -> Result<usize> {
        let staging = self.index.create_staging().await?;
        tracing::info!(namespace = %staging, "building staging namespace");

        let result = async {
            let written = self.index.upsert_chunks(&staging, chunks).await?;
            self.index.promote(&staging).await?;
            Ok::<_, anyhow::Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tracing::info!(namespace = %staging, records = written, "promoted namespace");
                Ok(written)
            }
            Err(e) => {
                self.index.discard(&staging).await;
                Err(e.context(format!("Rebuild of {} failed", staging)))
            }
        }
    }

    async fn publish(&self) -> Result<usize> {
        let engine = self.index.engine();
        let Some(dir) = engine.snapshot_dir().map(|d| d.to_path_buf()) else {
            tracing::debug!("index engine has no on-disk snapshot to publish");
            return Ok(0);
        };

        engine.checkpoint().await.context("Failed to checkpoint index")?;
        let pushed = self
            .mirror
            .push_directory(&dir)
            .await
            .context("Failed to publish snapshot")?;
        tracing::info!(objects = pushed, dir = %dir.display(), "published snapshot");
        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_objects::FsObjectStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use related_index_core::embedding::Embedder;
    use related_index_core::models::Document;
    use related_index_core::objects::ObjectStore;
    use related_index_core::store::memory::InMemoryIndex;
    use tempfile::TempDir;

    struct FixedSource(Vec<Document>);

    #[async_trait]
    impl ContentSource for FixedSource {
        async fn list_eligible_documents(&self) -> Result<Vec<Document>> {
            Ok(self.0.clone())
        }
        async fn get_document_text(&self, _id: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct CountingEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                anyhow::bail!("embedding service unavailable");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn doc(id: &str, day: u32, text: &str) -> Document {
        Document {
            id: id.to_string(),
            raw_text: text.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        }
    }

    fn builder(docs: Vec<Document>, index: Arc<IndexClient>, bucket: &TempDir) -> IndexBuilder {
        let store = Arc::new(FsObjectStore::new(bucket.path()));
        let mirror = ObjectMirror::new(store, "index/").unwrap();
        IndexBuilder::new(
            Arc::new(FixedSource(docs)),
            index,
            Arc::new(mirror),
            8000,
            Duration::ZERO,
        )
    }

    fn client(fail: bool) -> Arc<IndexClient> {
        Arc::new(IndexClient::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(CountingEmbedder { fail }),
            "posts",
        ))
    }

    #[tokio::test]
    async fn report_counts_duplicates_and_empties() {
        let bucket = TempDir::new().unwrap();
        let index = client(false);
        let docs = vec![
            doc("1", 1, "first post"),
            doc("2", 2, "<p>second</p>"),
            doc("1", 3, "duplicate of first"),
            doc("3", 4, "!!! ???"),
        ];

        let report = builder(docs, index.clone(), &bucket).rebuild().await.unwrap();
        assert_eq!(report.fetched, 4);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.published, 0);
        assert_eq!(index.live_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn nothing_eligible_leaves_mirror_untouched() {
        let bucket = TempDir::new().unwrap();
        let store = FsObjectStore::new(bucket.path());
        store.put_object("index/index.sqlite3", vec![7]).await.unwrap();

        let report = builder(Vec::new(), client(false), &bucket).rebuild().await.unwrap();
        assert_eq!(report, BuildReport::default());
        assert_eq!(store.list_objects("index/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_embedding_keeps_previous_index_live() {
        let bucket = TempDir::new().unwrap();
        let good = client(false);
        builder(vec![doc("1", 1, "kept post")], good.clone(), &bucket)
            .rebuild()
            .await
            .unwrap();
        let live = good.live_namespace().await.unwrap();

        let failing = Arc::new(IndexClient::new(
            good.engine().clone(),
            Arc::new(CountingEmbedder { fail: true }),
            "posts",
        ));
        let result = builder(vec![doc("2", 2, "new post")], failing.clone(), &bucket)
            .rebuild()
            .await;
        assert!(result.is_err());
        assert_eq!(failing.live_namespace().await.unwrap(), live);
        assert_eq!(failing.live_count().await.unwrap(), 1);
        assert_eq!(failing.engine().list_namespaces().await.unwrap().len(), 1);
    }
}
