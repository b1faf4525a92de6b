//! Telemetry sinks and the periodic flush task.
//!
//! The HTTP sink posts each batch as JSON:
//!
//! ```json
//! {"application": "related-index", "namespace": "related", "metrics": {"requests": 12}}
//! ```
//!
//! optionally authenticating with a client certificate (`key_path` +
//! `cert_path`, PEM). The log sink writes the batch to `tracing` instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;

use related_index_core::metrics::{CounterSet, FlushOutcome, MetricsAggregator, TelemetrySink};

use crate::config::TelemetryConfig;

/// Build the sink selected by `telemetry.sink`.
pub fn create_sink(config: &TelemetryConfig) -> Result<Arc<dyn TelemetrySink>> {
    match config.sink.as_str() {
        "http" => Ok(Arc::new(HttpTelemetrySink::new(config)?)),
        "log" => Ok(Arc::new(LogTelemetrySink)),
        other => bail!("Unknown telemetry sink: {}", other),
    }
}

pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
    application: String,
    namespace: String,
}

impl HttpTelemetrySink {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow!("telemetry.endpoint required for the http sink"))?;

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        match (&config.key_path, &config.cert_path) {
            (Some(key), Some(cert)) => {
                let mut pem = std::fs::read(cert)
                    .with_context(|| format!("Failed to read {}", cert.display()))?;
                pem.push(b'\n');
                pem.extend(
                    std::fs::read(key)
                        .with_context(|| format!("Failed to read {}", key.display()))?,
                );
                let identity = reqwest::Identity::from_pem(&pem)
                    .context("Invalid telemetry client certificate")?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => bail!("telemetry.key_path and telemetry.cert_path must be set together"),
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
            application: config.application.clone(),
            namespace: config.namespace.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn send(&self, counters: &CounterSet) -> Result<()> {
        let body = json!({
            "application": self.application,
            "namespace": self.namespace,
            "metrics": counters,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telemetry endpoint unreachable: {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Telemetry endpoint returned {}: {}", status, text);
        }
        Ok(())
    }
}

/// Writes each batch to the log.
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn send(&self, counters: &CounterSet) -> Result<()> {
        tracing::info!(metrics = ?counters, "metrics");
        Ok(())
    }
}

/// Flush `aggregator` into `sink` every `period`, starting immediately.
///
/// Stops for good on the first failed send; counters keep accumulating in
/// the aggregator afterwards but are no longer shipped. Abort the returned
/// handle to stop the loop.
pub fn run_flush_loop(
    aggregator: Arc<MetricsAggregator>,
    sink: Arc<dyn TelemetrySink>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match aggregator.flush(sink.as_ref()).await {
                Ok(FlushOutcome::Empty) => {}
                Ok(FlushOutcome::Sent(n)) => tracing::debug!(counters = n, "flushed metrics"),
                Err(e) => {
                    tracing::error!(error = %e, "metrics flush failed; stopping flush loop");
                    break;
                }
            }
        }
    })
}
