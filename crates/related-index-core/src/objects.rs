//! Object-storage capability used as the snapshot mirror.

use anyhow::Result;
use async_trait::async_trait;

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full key within the bucket.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

/// Flat key/value object store (S3 or anything shaped like it).
///
/// Keys use `/` as a separator; "directories" are only key prefixes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// List every object whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete one object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Download one object's bytes.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
}
