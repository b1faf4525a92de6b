//! Configuration parsing and validation.
//!
//! Related Index is configured via a TOML file (default: `config/relidx.toml`).
//! After parsing, a handful of deployment-specific values can be overridden
//! from the environment, then the whole file is validated.
//!
//! # Sections
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[replica]` | Role (`leader`/`follower`) and daily run times |
//! | `[content]` | Backing-store URL and the SQL used to read documents |
//! | `[index]` | Local index directory, alias, chunk bound, scratch space |
//! | `[embedding]` | Embedding provider settings |
//! | `[mirror]` | Object-storage mirror the leader publishes to |
//! | `[telemetry]` | Where flushed counters go |
//! | `[server]` | HTTP bind address |
//!
//! # Environment overrides
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `RELIDX_ROLE` | `replica.role` |
//! | `RELIDX_CONTENT_URL` | `content.url` |
//! | `RELIDX_MIRROR_BUCKET` | `mirror.bucket` |
//! | `AWS_REGION` | `mirror.region` |
//! | `RELIDX_TELEMETRY_NAMESPACE` | `telemetry.namespace` |
//!
//! Credentials (`OPENAI_API_KEY`, `AWS_ACCESS_KEY_ID`, ...) are never read
//! from the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use related_index_core::models::ReplicaRole;
use related_index_core::preprocess::DEFAULT_CHUNK_CHARS;
use related_index_core::schedule::{default_slot, DailyTime};

use crate::content::{DEFAULT_ELIGIBLE_QUERY, DEFAULT_TEXT_QUERY};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub replica: ReplicaConfig,
    #[serde(default)]
    pub content: ContentConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplicaConfig {
    pub role: ReplicaRole,
    #[serde(default)]
    pub leader_at: Option<DailyTime>,
    #[serde(default)]
    pub follower_at: Option<DailyTime>,
}

impl ReplicaConfig {
    /// Daily slot for this replica's role.
    pub fn slot(&self) -> DailyTime {
        self.slot_for(self.role)
    }

    /// Daily slot for `role`, configured or default.
    pub fn slot_for(&self, role: ReplicaRole) -> DailyTime {
        let configured = match role {
            ReplicaRole::Leader => self.leader_at,
            ReplicaRole::Follower => self.follower_at,
        };
        configured.unwrap_or_else(|| default_slot(role))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default)]
    pub url: String,
    /// Must return `id` (text), `body` (text, nullable) and
    /// `published_at` (integer Unix seconds).
    #[serde(default = "default_eligible_query")]
    pub eligible_query: String,
    /// Takes one bound parameter (the id) and returns `body`.
    #[serde(default = "default_text_query")]
    pub text_query: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            eligible_query: default_eligible_query(),
            text_query: default_text_query(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_eligible_query() -> String {
    DEFAULT_ELIGIBLE_QUERY.to_string()
}
fn default_text_query() -> String {
    DEFAULT_TEXT_QUERY.to_string()
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub dir: PathBuf,
    #[serde(default = "default_alias")]
    pub alias: String,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_alias() -> String {
    "embedded_posts".to_string()
}
fn default_chunk_chars() -> usize {
    DEFAULT_CHUNK_CHARS
}
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Pause between purging the mirror and starting the build.
    #[serde(default = "default_purge_settle_secs")]
    pub purge_settle_secs: u64,
    /// Custom S3 endpoint (MinIO, LocalStack). Uses path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Root directory for the `filesystem` backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: String::new(),
            region: default_region(),
            prefix: default_prefix(),
            purge_settle_secs: default_purge_settle_secs(),
            endpoint_url: None,
            root: None,
        }
    }
}

fn default_backend() -> String {
    "s3".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_prefix() -> String {
    "index/".to_string()
}
fn default_purge_settle_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_sink")]
    pub sink: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_application")]
    pub application: String,
    #[serde(default = "default_flush_secs")]
    pub flush_secs: u64,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            endpoint: None,
            namespace: default_namespace(),
            application: default_application(),
            flush_secs: default_flush_secs(),
            key_path: None,
            cert_path: None,
        }
    }
}

fn default_sink() -> String {
    "log".to_string()
}
fn default_namespace() -> String {
    "related".to_string()
}
fn default_application() -> String {
    "related-index".to_string()
}
fn default_flush_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Read, override from the process environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(role) = lookup("RELIDX_ROLE") {
        config.replica.role = role.parse()?;
    }
    if let Some(url) = lookup("RELIDX_CONTENT_URL") {
        config.content.url = url;
    }
    if let Some(bucket) = lookup("RELIDX_MIRROR_BUCKET") {
        config.mirror.bucket = bucket;
    }
    if let Some(region) = lookup("AWS_REGION") {
        config.mirror.region = region;
    }
    if let Some(namespace) = lookup("RELIDX_TELEMETRY_NAMESPACE") {
        config.telemetry.namespace = namespace;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    // Replica
    let leader_at = config.replica.slot_for(ReplicaRole::Leader);
    let follower_at = config.replica.slot_for(ReplicaRole::Follower);
    if follower_at <= leader_at {
        bail!(
            "replica.follower_at ({}) must be later in the day than replica.leader_at ({})",
            follower_at,
            leader_at
        );
    }

    // Index
    if config.index.chunk_chars == 0 {
        bail!("index.chunk_chars must be > 0");
    }
    if config.index.alias.is_empty()
        || !config
            .index
            .alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!(
            "index.alias must be non-empty and contain only [A-Za-z0-9_], got '{}'",
            config.index.alias
        );
    }

    // Embedding
    if config.embedding.is_enabled() {
        if config.embedding.provider != "local"
            && (config.embedding.dims.is_none() || config.embedding.dims == Some(0))
        {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "local" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    // Mirror
    if config.mirror.prefix.trim_matches('/').is_empty() {
        bail!(
            "mirror.prefix must name a key prefix, got '{}'",
            config.mirror.prefix
        );
    }
    match config.mirror.backend.as_str() {
        "s3" => {
            if config.mirror.bucket.is_empty() {
                bail!("mirror.bucket must be set when mirror.backend is 's3'");
            }
        }
        "filesystem" => {
            if config.mirror.root.is_none() {
                bail!("mirror.root must be set when mirror.backend is 'filesystem'");
            }
        }
        other => bail!(
            "Unknown mirror backend: '{}'. Must be s3 or filesystem.",
            other
        ),
    }

    // Telemetry
    match config.telemetry.sink.as_str() {
        "log" => {}
        "http" => {
            if config.telemetry.endpoint.is_none() {
                bail!("telemetry.endpoint must be set when telemetry.sink is 'http'");
            }
        }
        other => bail!("Unknown telemetry sink: '{}'. Must be http or log.", other),
    }
    if config.telemetry.flush_secs == 0 {
        bail!("telemetry.flush_secs must be > 0");
    }
    if config.telemetry.key_path.is_some() != config.telemetry.cert_path.is_some() {
        bail!("telemetry.key_path and telemetry.cert_path must be set together");
    }

    Ok(())
}
