//! In-memory [`IndexEngine`] implementation for tests.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Queries are brute-force
//! cosine distance over every record in the name space.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{IndexRecord, Neighbor};

use super::IndexEngine;

type Namespace = BTreeMap<String, IndexRecord>;

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<String, Namespace>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexEngine for InMemoryIndex {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        let mut spaces = self.namespaces.write().unwrap();
        spaces.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let mut spaces = self.namespaces.write().unwrap();
        let Some(space) = spaces.get_mut(namespace) else {
            bail!("index namespace not found: {}", namespace);
        };
        for r in records {
            space.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn query(&self, namespace: &str, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let spaces = self.namespaces.read().unwrap();
        let Some(space) = spaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<Neighbor> = space
            .values()
            .map(|r| Neighbor {
                id: r.id.clone(),
                distance: cosine_distance(vector, &r.embedding),
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
        let spaces = self.namespaces.read().unwrap();
        Ok(spaces.get(namespace).map(|s| s.len()).unwrap_or(0))
    }

    async fn records(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<IndexRecord>> {
        let spaces = self.namespaces.read().unwrap();
        Ok(spaces
            .get(namespace)
            .map(|s| s.values().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces.write().unwrap().remove(name);
        self.aliases.write().unwrap().retain(|_, target| target != name);
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.namespaces.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        Ok(self.aliases.read().unwrap().get(alias).cloned())
    }

    async fn set_alias(&self, alias: &str, namespace: &str) -> Result<Option<String>> {
        if !self.namespaces.read().unwrap().contains_key(namespace) {
            bail!("cannot alias missing namespace: {}", namespace);
        }
        Ok(self
            .aliases
            .write()
            .unwrap()
            .insert(alias.to_string(), namespace.to_string()))
    }
}
