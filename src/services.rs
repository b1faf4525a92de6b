//! Wiring from [`Config`] to the concrete adapters.
//!
//! Each constructor opens exactly one external resource so the CLI commands
//! only pay for what they use: `sync` never touches the content database,
//! `related` never touches the mirror.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use related_index_core::index_client::IndexClient;
use related_index_core::metrics::MetricsAggregator;
use related_index_core::query::QueryService;
use related_index_core::source::ContentSource;

use crate::builder::IndexBuilder;
use crate::config::Config;
use crate::content::SqlContentSource;
use crate::embedding::create_embedder;
use crate::mirror::ObjectMirror;
use crate::sqlite_index::SqliteIndex;
use crate::sync::IndexSynchronizer;

/// Open the local index and pair it with the configured embedder.
pub async fn open_index(config: &Config) -> Result<Arc<IndexClient>> {
    let engine = SqliteIndex::open(&config.index.dir).await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(Arc::new(
        IndexClient::new(Arc::new(engine), embedder, &config.index.alias)
            .with_batch_size(config.embedding.batch_size),
    ))
}

pub fn open_mirror(config: &Config) -> Result<Arc<ObjectMirror>> {
    Ok(Arc::new(ObjectMirror::from_config(&config.mirror)?))
}

pub async fn open_content(config: &Config) -> Result<Arc<dyn ContentSource>> {
    Ok(Arc::new(SqlContentSource::connect(&config.content).await?))
}

pub async fn builder(config: &Config, index: Arc<IndexClient>) -> Result<IndexBuilder> {
    Ok(IndexBuilder::new(
        open_content(config).await?,
        index,
        open_mirror(config)?,
        config.index.chunk_chars,
        Duration::from_secs(config.mirror.purge_settle_secs),
    ))
}

pub fn synchronizer(config: &Config, index: Arc<IndexClient>) -> Result<IndexSynchronizer> {
    Ok(IndexSynchronizer::new(
        index,
        open_mirror(config)?,
        config.index.scratch_dir.clone(),
    ))
}

pub async fn query_service(
    config: &Config,
    index: Arc<IndexClient>,
    metrics: Arc<MetricsAggregator>,
) -> Result<Arc<QueryService>> {
    Ok(Arc::new(QueryService::new(
        open_content(config).await?,
        index,
        metrics,
        config.index.chunk_chars,
    )))
}
