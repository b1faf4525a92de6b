//! Backing-store capability.
//!
//! The selection policy for eligible documents (tags, categories,
//! popularity, recency) lives entirely on the store side. The core only
//! sees the resulting set.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// Read access to the content corpus.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// All documents eligible for indexing at rebuild time.
    ///
    /// The set may contain duplicates and arrive in any order; callers
    /// deduplicate by id and order by publish date.
    async fn list_eligible_documents(&self) -> Result<Vec<Document>>;

    /// The raw text of one document, or `None` when no such document exists.
    async fn get_document_text(&self, id: &str) -> Result<Option<String>>;
}

/// Deduplicate by id (first occurrence wins) and stable-sort by publish date.
///
/// Returns the cleaned list together with the number of duplicates dropped.
pub fn dedup_and_order(documents: Vec<Document>) -> (Vec<Document>, usize) {
    let total = documents.len();
    let mut seen = std::collections::HashSet::with_capacity(total);
    let mut unique: Vec<Document> = documents
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect();
    unique.sort_by_key(|d| d.published_at);
    let duplicates = total - unique.len();
    (unique, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn doc(id: &str, day: u32, text: &str) -> Document {
        Document {
            id: id.to_string(),
            raw_text: text.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn dedup_keeps_first_and_orders_by_date() {
        let docs = vec![
            doc("3", 9, "c"),
            doc("1", 2, "a"),
            doc("3", 9, "c-again"),
            doc("2", 5, "b"),
        ];
        let (unique, dupes) = dedup_and_order(docs);
        assert_eq!(dupes, 1);
        let ids: Vec<&str> = unique.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(unique[2].raw_text, "c");
    }
}
