//! Daily replica job.
//!
//! Leaders run the [`IndexBuilder`], followers the [`IndexSynchronizer`],
//! once a day at their configured UTC slot. One tokio task owns the loop;
//! a run always completes before the next slot is computed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use related_index_core::metrics::{names, MetricsAggregator};
use related_index_core::schedule::{following_run, next_run_after, DailyTime};

use crate::builder::IndexBuilder;
use crate::sync::{IndexSynchronizer, SyncOutcome};

/// A unit of work the scheduler runs once per day.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

#[async_trait]
impl ScheduledJob for IndexBuilder {
    fn name(&self) -> &str {
        "rebuild"
    }

    async fn run(&self) -> Result<()> {
        self.rebuild().await.map(|_| ())
    }
}

#[async_trait]
impl ScheduledJob for IndexSynchronizer {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self) -> Result<()> {
        if self.sync().await? == SyncOutcome::Unchanged {
            tracing::info!("local index unchanged");
        }
        Ok(())
    }
}

/// Run `job` once, logging and counting the outcome. Returns `true` on success.
pub async fn run_job(job: &dyn ScheduledJob, metrics: &MetricsAggregator) -> bool {
    let started = std::time::Instant::now();
    match job.run().await {
        Ok(()) => {
            metrics.increment(names::JOB_RUNS);
            tracing::info!(
                job = job.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            );
            true
        }
        Err(e) => {
            metrics.increment(names::JOB_FAILURES);
            tracing::error!(job = job.name(), error = %format!("{:#}", e), "job failed");
            false
        }
    }
}

/// Spawn the daily loop for `job` at `at` (UTC).
pub fn spawn_daily(
    job: Arc<dyn ScheduledJob>,
    at: DailyTime,
    metrics: Arc<MetricsAggregator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = next_run_after(Utc::now(), at);
        loop {
            tracing::info!(job = job.name(), next_run = %next, "scheduled");
            tokio::time::sleep(delay_until(next, Utc::now())).await;

            run_job(job.as_ref(), &metrics).await;
            next = following_run(next, Utc::now());
        }
    })
}

fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
