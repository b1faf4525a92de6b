//! Snapshot mirror: a key prefix in an [`ObjectStore`].
//!
//! The leader pushes its index directory under the prefix; followers pull
//! everything under the prefix into a scratch directory. Key layout under
//! the prefix mirrors the directory layout.

use std::path::{Component, Path};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use related_index_core::objects::ObjectStore;

use crate::config::MirrorConfig;
use crate::fs_objects::FsObjectStore;
use crate::s3::S3ObjectStore;

/// SQLite side files that are never part of a published snapshot.
const SKIPPED_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

pub struct ObjectMirror {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectMirror {
    /// Mirror rooted at `prefix`. An empty prefix is rejected: purging it
    /// would delete every object in the bucket.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            bail!("mirror prefix must not be empty, got '{}'", prefix);
        }
        Ok(Self {
            store,
            prefix: format!("{}/", trimmed),
        })
    }

    /// Mirror for the configured backend.
    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend.as_str() {
            "s3" => Arc::new(S3ObjectStore::from_config(config)?),
            "filesystem" => {
                let root = config
                    .root
                    .clone()
                    .context("mirror.root required for the filesystem backend")?;
                Arc::new(FsObjectStore::new(root))
            }
            other => bail!("Unknown mirror backend: {}", other),
        };
        Self::new(store, &config.prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Upload every file under `dir`. Returns the number of objects written.
    pub async fn push_directory(&self, dir: &Path) -> Result<usize> {
        let mut pushed = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if SKIPPED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }

            let relative = entry.path().strip_prefix(dir).with_context(|| {
                format!("{} is outside {}", entry.path().display(), dir.display())
            })?;
            let key = format!(
                "{}{}",
                self.prefix,
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            );

            let body = tokio::fs::read(entry.path())
                .await
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            let size = body.len();
            self.store
                .put_object(&key, body)
                .await
                .with_context(|| format!("Failed to upload {}", key))?;
            tracing::debug!(key = %key, size, "uploaded snapshot object");
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Download every object under the prefix into `dest`.
    ///
    /// Returns the number of files written.
    pub async fn pull_directory(&self, dest: &Path) -> Result<usize> {
        let mut pulled = 0;
        for object in self.store.list_objects(&self.prefix).await? {
            let Some(relative) = object.key.strip_prefix(&self.prefix) else {
                continue;
            };
            if relative.is_empty() || relative.ends_with('/') {
                continue;
            }
            if Path::new(relative)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                tracing::warn!(key = %object.key, "skipping object with unsafe key");
                continue;
            }

            let path = dest.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let body = self
                .store
                .get_object(&object.key)
                .await
                .with_context(|| format!("Failed to download {}", object.key))?;
            tokio::fs::write(&path, body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            pulled += 1;
        }
        Ok(pulled)
    }

    /// Delete every object under the prefix. Returns the number deleted.
    pub async fn purge_prefix(&self) -> Result<usize> {
        let objects = self.store.list_objects(&self.prefix).await?;
        for object in &objects {
            self.store.delete_object(&object.key).await?;
        }
        Ok(objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mirror(root: &Path) -> ObjectMirror {
        ObjectMirror::new(Arc::new(FsObjectStore::new(root)), "/index").unwrap()
    }

    #[tokio::test]
    async fn push_then_pull_reproduces_directory() {
        let bucket = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("index.sqlite3"), b"db").unwrap();
        std::fs::write(src.path().join("index.sqlite3-wal"), b"wal").unwrap();
        std::fs::create_dir_all(src.path().join("extra")).unwrap();
        std::fs::write(src.path().join("extra/meta.json"), b"{}").unwrap();

        let m = mirror(bucket.path());
        assert_eq!(m.prefix(), "index/");
        assert_eq!(m.push_directory(src.path()).await.unwrap(), 2);

        let dest = TempDir::new().unwrap();
        assert_eq!(m.pull_directory(dest.path()).await.unwrap(), 2);
        assert_eq!(std::fs::read(dest.path().join("index.sqlite3")).unwrap(), b"db");
        assert_eq!(std::fs::read(dest.path().join("extra/meta.json")).unwrap(), b"{}");
        assert!(!dest.path().join("index.sqlite3-wal").exists());
    }

    #[tokio::test]
    async fn purge_only_touches_prefix() {
        let bucket = TempDir::new().unwrap();
        let store = Arc::new(FsObjectStore::new(bucket.path()));
        store.put_object("index/a", vec![1]).await.unwrap();
        store.put_object("index/b", vec![2]).await.unwrap();
        store.put_object("keep/c", vec![3]).await.unwrap();

        let m = ObjectMirror::new(store.clone(), "index/").unwrap();
        assert_eq!(m.purge_prefix().await.unwrap(), 2);
        assert_eq!(m.purge_prefix().await.unwrap(), 0);
        assert_eq!(store.list_objects("").await.unwrap().len(), 1);
    }

    #[test]
    fn rejects_prefix_that_would_cover_the_bucket() {
        let bucket = TempDir::new().unwrap();
        for prefix in ["", "/", "//"] {
            let store = Arc::new(FsObjectStore::new(bucket.path()));
            assert!(ObjectMirror::new(store, prefix).is_err(), "prefix {:?}", prefix);
        }
    }

    #[tokio::test]
    async fn empty_mirror_pulls_nothing() {
        let bucket = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        assert_eq!(mirror(bucket.path()).pull_directory(dest.path()).await.unwrap(), 0);
    }
}
