//! Vector index abstraction.
//!
//! The [`IndexEngine`] trait is the embedding/vector-index capability the
//! service orchestrates. An engine holds any number of *name spaces* (one
//! complete index each) plus *aliases* that point at a name space. Readers
//! always go through an alias, so a rebuilt name space becomes visible in a
//! single alias update instead of a delete-then-refill.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_namespace`](IndexEngine::create_namespace) | Create (or open) an empty name space |
//! | [`upsert`](IndexEngine::upsert) | Insert or replace records |
//! | [`query`](IndexEngine::query) | k nearest neighbors by cosine distance |
//! | [`count`](IndexEngine::count) | Number of records |
//! | [`records`](IndexEngine::records) | Page through stored records with vectors |
//! | [`delete_namespace`](IndexEngine::delete_namespace) | Drop a name space |
//! | [`resolve_alias`](IndexEngine::resolve_alias) / [`set_alias`](IndexEngine::set_alias) | Live pointer |

pub mod memory;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexRecord, Neighbor};

#[async_trait]
pub trait IndexEngine: Send + Sync {
    /// Create an empty name space, or do nothing if it already exists.
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Insert or replace records (keyed by id) in an existing name space.
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `k` records nearest to `vector`, nearest first.
    async fn query(&self, namespace: &str, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of records in a name space (`0` if it does not exist).
    async fn count(&self, namespace: &str) -> Result<usize>;

    /// A page of records in stable order.
    async fn records(&self, namespace: &str, offset: usize, limit: usize)
        -> Result<Vec<IndexRecord>>;

    /// Drop a name space and any alias pointing at it.
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// All existing name spaces.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// The name space an alias currently points at.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>>;

    /// Atomically point `alias` at `namespace`, returning the previous target.
    async fn set_alias(&self, alias: &str, namespace: &str) -> Result<Option<String>>;

    /// Make the on-disk snapshot self-contained (e.g. flush a write-ahead log).
    async fn checkpoint(&self) -> Result<()> {
        Ok(())
    }

    /// Directory holding the engine's on-disk snapshot, if it has one.
    fn snapshot_dir(&self) -> Option<&Path> {
        None
    }
}
