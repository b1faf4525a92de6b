//! Core data models used throughout Related Index.
//!
//! These types represent the documents, index records, and query results
//! that flow through the rebuild, sync, and query paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format stored alongside every indexed chunk.
pub const FORMATTED_DATE: &str = "%Y-%m-%d %H:%M:%S";

/// Raw document read from the backing store.
///
/// Consumed once per rebuild cycle and not retained after indexing.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub raw_text: String,
    pub published_at: DateTime<Utc>,
}

/// Date metadata stored with each chunk, derived from `Document::published_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub formatted_date: String,
    pub timestamp: i64,
}

impl ChunkMetadata {
    pub fn from_published_at(published_at: DateTime<Utc>) -> Self {
        Self {
            formatted_date: published_at.format(FORMATTED_DATE).to_string(),
            timestamp: published_at.timestamp(),
        }
    }
}

/// The preprocessed, length-bounded text of one document.
///
/// One chunk per document: `id` equals the source document id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// An indexed chunk together with its embedding vector.
///
/// This is what an index name space physically stores, and what a follower
/// streams out of a downloaded snapshot into its own live index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl IndexRecord {
    pub fn from_chunk(chunk: IndexedChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            metadata: chunk.metadata,
            embedding,
        }
    }
}

/// A nearest-neighbor hit returned by an index query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance (`1 - cosine similarity`); smaller is nearer.
    pub distance: f32,
}

/// Replica role, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    /// Rebuilds the index from the backing store and publishes it.
    Leader,
    /// Adopts the snapshot the leader published.
    Follower,
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRole::Leader => f.write_str("leader"),
            ReplicaRole::Follower => f.write_str("follower"),
        }
    }
}

impl FromStr for ReplicaRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leader" => Ok(ReplicaRole::Leader),
            "follower" => Ok(ReplicaRole::Follower),
            other => anyhow::bail!(
                "Unknown replica role: '{}'. Must be leader or follower.",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metadata_is_derived_from_publish_date() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 13, 5, 9).unwrap();
        let meta = ChunkMetadata::from_published_at(at);
        assert_eq!(meta.formatted_date, "2024-02-01 13:05:09");
        assert_eq!(meta.timestamp, at.timestamp());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Leader".parse::<ReplicaRole>().unwrap(), ReplicaRole::Leader);
        assert_eq!(" follower ".parse::<ReplicaRole>().unwrap(), ReplicaRole::Follower);
        assert!("production-east".parse::<ReplicaRole>().is_err());
    }
}
