//! Follower snapshot adoption.
//!
//! Downloads whatever the leader last published into a scratch directory,
//! opens it read-only, and streams its live name space into a fresh local
//! staging name space that is then promoted through the alias. An empty or
//! missing snapshot keeps the current local index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use related_index_core::index_client::IndexClient;
use related_index_core::store::IndexEngine;

use crate::mirror::ObjectMirror;
use crate::sqlite_index::SqliteIndex;

/// Records copied per page when adopting a snapshot.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Adopted { records: usize },
    Unchanged,
}

pub struct IndexSynchronizer {
    index: Arc<IndexClient>,
    mirror: Arc<ObjectMirror>,
    scratch_root: PathBuf,
}

impl IndexSynchronizer {
    pub fn new(
        index: Arc<IndexClient>,
        mirror: Arc<ObjectMirror>,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            index,
            mirror,
            scratch_root,
        }
    }

    /// Pull the published snapshot and adopt it if it has any records.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let scratch = self.scratch_root.join(format!(
            "snapshot_{}_{}",
            Utc::now().format("%Y-%m-%d_%H-%M-%S"),
            &suffix[..8]
        ));

        let result = self.sync_from(&scratch).await;

        if scratch.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                tracing::warn!(
                    dir = %scratch.display(),
                    error = %e,
                    "failed to remove scratch directory"
                );
            }
        }
        result
    }

    async fn sync_from(&self, scratch: &Path) -> Result<SyncOutcome> {
        tokio::fs::create_dir_all(scratch)
            .await
            .with_context(|| format!("Failed to create {}", scratch.display()))?;

        let pulled = self.mirror.pull_directory(scratch).await?;
        tracing::info!(objects = pulled, dir = %scratch.display(), "pulled snapshot");

        let Some(snapshot) = SqliteIndex::open_snapshot(scratch).await? else {
            tracing::warn!("mirror holds no index file; keeping local index");
            return Ok(SyncOutcome::Unchanged);
        };

        let outcome = self.adopt(&snapshot).await;
        snapshot.close().await;
        outcome
    }

    async fn adopt(&self, snapshot: &SqliteIndex) -> Result<SyncOutcome> {
        let Some(source_ns) = snapshot.resolve_alias(self.index.alias()).await? else {
            tracing::warn!(
                alias = %self.index.alias(),
                "snapshot has no live namespace; keeping local index"
            );
            return Ok(SyncOutcome::Unchanged);
        };
        let total = snapshot.count(&source_ns).await?;
        if total == 0 {
            tracing::warn!(namespace = %source_ns, "snapshot is empty; keeping local index");
            return Ok(SyncOutcome::Unchanged);
        }

        let staging = self.index.create_staging().await?;
        let copied = async {
            let mut copied = 0;
            loop {
                let page = snapshot.records(&source_ns, copied, PAGE_SIZE).await?;
                if page.is_empty() {
                    break;
                }
                self.index.upsert_records(&staging, &page).await?;
                copied += page.len();
            }
            self.index.promote(&staging).await?;
            Ok::<_, anyhow::Error>(copied)
        }
        .await;

        match copied {
            Ok(records) => {
                tracing::info!(namespace = %staging, records, "adopted snapshot");
                Ok(SyncOutcome::Adopted { records })
            }
            Err(e) => {
                self.index.discard(&staging).await;
                Err(e.context("Failed to adopt snapshot"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_objects::FsObjectStore;
    use crate::sqlite_index::INDEX_FILE;
    use async_trait::async_trait;
    use related_index_core::embedding::Embedder;
    use related_index_core::models::{ChunkMetadata, IndexRecord};
    use related_index_core::objects::ObjectStore;
    use tempfile::TempDir;

    struct NoEmbedder;

    #[async_trait]
    impl Embedder for NoEmbedder {
        fn model_name(&self) -> &str {
            "none"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("not used when adopting snapshots")
        }
    }

    async fn client(dir: &Path) -> Arc<IndexClient> {
        let engine = SqliteIndex::open(dir).await.unwrap();
        Arc::new(IndexClient::new(Arc::new(engine), Arc::new(NoEmbedder), "posts"))
    }

    fn records(n: usize) -> Vec<IndexRecord> {
        (0..n)
            .map(|i| IndexRecord {
                id: i.to_string(),
                text: format!("post {}", i),
                metadata: ChunkMetadata {
                    formatted_date: "2024-01-01 00:00:00".to_string(),
                    timestamp: 1_704_067_200,
                },
                embedding: vec![i as f32, 1.0],
            })
            .collect()
    }

    fn mirror(bucket: &TempDir) -> Arc<ObjectMirror> {
        let store = Arc::new(FsObjectStore::new(bucket.path()));
        Arc::new(ObjectMirror::new(store, "index/").unwrap())
    }

    fn synchronizer(
        follower: &Arc<IndexClient>,
        bucket: &TempDir,
        scratch: &TempDir,
    ) -> IndexSynchronizer {
        IndexSynchronizer::new(follower.clone(), mirror(bucket), scratch.path().to_path_buf())
    }

    /// Follower with a live name space of three records.
    async fn seeded_follower(dir: &Path) -> (Arc<IndexClient>, String) {
        let follower = client(dir).await;
        let ns = follower.create_staging().await.unwrap();
        follower.upsert_records(&ns, &records(3)).await.unwrap();
        follower.promote(&ns).await.unwrap();
        (follower, ns)
    }

    /// Checkpoint a leader index and push its directory to the mirror.
    async fn publish_leader(bucket: &TempDir, leader_dir: &TempDir, leader: SqliteIndex) {
        leader.checkpoint().await.unwrap();
        leader.close().await;
        mirror(bucket).push_directory(leader_dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn adopts_published_snapshot_across_pages() {
        let bucket = TempDir::new().unwrap();
        let leader_dir = TempDir::new().unwrap();
        let leader = client(leader_dir.path()).await;
        let ns = leader.create_staging().await.unwrap();
        leader.upsert_records(&ns, &records(250)).await.unwrap();
        leader.promote(&ns).await.unwrap();
        leader.engine().checkpoint().await.unwrap();
        mirror(&bucket).push_directory(leader_dir.path()).await.unwrap();

        let follower_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let follower = client(follower_dir.path()).await;
        let sync = synchronizer(&follower, &bucket, &scratch);

        assert_eq!(sync.sync().await.unwrap(), SyncOutcome::Adopted { records: 250 });
        assert_eq!(follower.live_count().await.unwrap(), 250);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_mirror_keeps_local_index() {
        let bucket = TempDir::new().unwrap();
        let follower_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let (follower, ns) = seeded_follower(follower_dir.path()).await;

        let sync = synchronizer(&follower, &bucket, &scratch);
        assert_eq!(sync.sync().await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(follower.live_namespace().await.unwrap(), Some(ns));
        assert_eq!(follower.live_count().await.unwrap(), 3);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn snapshot_with_empty_live_namespace_keeps_local_index() {
        let bucket = TempDir::new().unwrap();
        let leader_dir = TempDir::new().unwrap();
        let leader = SqliteIndex::open(leader_dir.path()).await.unwrap();
        leader.create_namespace("posts_purged").await.unwrap();
        leader.set_alias("posts", "posts_purged").await.unwrap();
        publish_leader(&bucket, &leader_dir, leader).await;

        let follower_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let (follower, ns) = seeded_follower(follower_dir.path()).await;

        let sync = synchronizer(&follower, &bucket, &scratch);
        assert_eq!(sync.sync().await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(follower.live_namespace().await.unwrap(), Some(ns));
        assert_eq!(follower.live_count().await.unwrap(), 3);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn snapshot_without_alias_keeps_local_index() {
        let bucket = TempDir::new().unwrap();
        let leader_dir = TempDir::new().unwrap();
        let leader = SqliteIndex::open(leader_dir.path()).await.unwrap();
        leader.create_namespace("posts_unpromoted").await.unwrap();
        leader.upsert("posts_unpromoted", &records(5)).await.unwrap();
        publish_leader(&bucket, &leader_dir, leader).await;

        let follower_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let (follower, ns) = seeded_follower(follower_dir.path()).await;

        let sync = synchronizer(&follower, &bucket, &scratch);
        assert_eq!(sync.sync().await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(follower.live_namespace().await.unwrap(), Some(ns));
        assert_eq!(follower.live_count().await.unwrap(), 3);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_an_error_and_scratch_is_removed() {
        let bucket = TempDir::new().unwrap();
        let store = FsObjectStore::new(bucket.path());
        store
            .put_object(&format!("index/{}", INDEX_FILE), b"not a database".to_vec())
            .await
            .unwrap();

        let follower_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let follower = client(follower_dir.path()).await;
        let sync = synchronizer(&follower, &bucket, &scratch);

        assert!(sync.sync().await.is_err());
        assert_eq!(follower.live_count().await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
