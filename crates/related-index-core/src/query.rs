//! Related-items query path.
//!
//! [`QueryService::find_related`] reads the querying document's text from
//! the backing store (not from the index), preprocesses it exactly as the
//! builder does, asks the live index for the nearest neighbors, and drops
//! the document itself from the answer.
//!
//! # Outcomes
//!
//! | Situation | Result | Counter |
//! |-----------|--------|---------|
//! | neighbors found | `Ok(ids)` | `requests` |
//! | nothing left after self-exclusion | `Ok(vec![])` | `results_empty` |
//! | malformed id or count | `Err(InvalidInput)` | `client_errors` |
//! | id not in the backing store | `Err(UnknownDocument)` | `client_errors` |
//! | store or index failure | `Err(Dependency)` | `errors` |
//!
//! Nothing is retried inline.

use std::sync::Arc;

use crate::index_client::IndexClient;
use crate::metrics::{names, MetricsAggregator};
use crate::preprocess::{chunk, normalize};
use crate::source::ContentSource;

/// Upper bound on `count`.
pub const MAX_RESULTS: usize = 100;

/// Longest accepted document id.
const MAX_ID_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("document not found: {0}")]
    UnknownDocument(String),

    #[error("dependency unavailable: {0:#}")]
    Dependency(anyhow::Error),
}

impl QueryError {
    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::InvalidInput(_) | QueryError::UnknownDocument(_))
    }
}

pub struct QueryService {
    source: Arc<dyn ContentSource>,
    index: Arc<IndexClient>,
    metrics: Arc<MetricsAggregator>,
    chunk_chars: usize,
}

impl QueryService {
    pub fn new(
        source: Arc<dyn ContentSource>,
        index: Arc<IndexClient>,
        metrics: Arc<MetricsAggregator>,
        chunk_chars: usize,
    ) -> Self {
        Self {
            source,
            index,
            metrics,
            chunk_chars,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Ids of the documents most similar to `document_id`, nearest first.
    ///
    /// Never contains `document_id` itself and holds at most `count` ids.
    pub async fn find_related(
        &self,
        document_id: &str,
        count: usize,
    ) -> Result<Vec<String>, QueryError> {
        self.metrics.increment(names::REQUESTS);

        let outcome = self.lookup(document_id, count).await;
        match &outcome {
            Ok(ids) if ids.is_empty() => {
                self.metrics.increment(names::RESULTS_EMPTY);
                tracing::info!(document_id, "no related documents after self-exclusion");
            }
            Ok(ids) => tracing::info!(document_id, results = ids.len(), "related documents"),
            Err(e) if e.is_client_error() => {
                self.metrics.increment(names::CLIENT_ERRORS);
                tracing::info!(document_id, error = %e, "rejected related-documents request");
            }
            Err(e) => {
                self.metrics.increment(names::ERRORS);
                tracing::error!(document_id, error = %e, "related-documents lookup failed");
            }
        }
        outcome
    }

    /// Count a request that was malformed before it could reach
    /// [`find_related`](Self::find_related) and return the error to report.
    pub fn reject(&self, message: impl Into<String>) -> QueryError {
        let err = QueryError::InvalidInput(message.into());
        self.metrics.increment(names::REQUESTS);
        self.metrics.increment(names::CLIENT_ERRORS);
        tracing::info!(error = %err, "rejected related-documents request");
        err
    }

    async fn lookup(&self, document_id: &str, count: usize) -> Result<Vec<String>, QueryError> {
        validate_id(document_id)?;
        if count == 0 || count > MAX_RESULTS {
            return Err(QueryError::InvalidInput(format!(
                "count must be between 1 and {}",
                MAX_RESULTS
            )));
        }

        let raw = self
            .source
            .get_document_text(document_id)
            .await
            .map_err(QueryError::Dependency)?
            .ok_or_else(|| QueryError::UnknownDocument(document_id.to_string()))?;

        let text = chunk(&normalize(&raw), self.chunk_chars);
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = self
            .index
            .query_text(&text, count)
            .await
            .map_err(QueryError::Dependency)?;

        Ok(neighbors
            .into_iter()
            .map(|n| n.id)
            .filter(|id| id != document_id)
            .collect())
    }
}

fn validate_id(id: &str) -> Result<(), QueryError> {
    if id.is_empty() {
        return Err(QueryError::InvalidInput("document id must not be empty".to_string()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(QueryError::InvalidInput(format!(
            "document id longer than {} characters",
            MAX_ID_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(QueryError::InvalidInput(format!("invalid document id: {:?}", id)));
    }
    Ok(())
}
