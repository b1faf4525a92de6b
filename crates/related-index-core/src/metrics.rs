//! In-process counter aggregation.
//!
//! Request handlers bump named counters on a shared [`MetricsAggregator`];
//! a single flush task periodically ships the whole set to a
//! [`TelemetrySink`] as one batch and starts again from empty.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

/// Counter name → count.
pub type CounterSet = BTreeMap<String, u64>;

/// Counter names used by the service.
pub mod names {
    pub const REQUESTS: &str = "requests";
    pub const RESULTS_EMPTY: &str = "results_empty";
    pub const CLIENT_ERRORS: &str = "client_errors";
    pub const ERRORS: &str = "errors";
    pub const JOB_RUNS: &str = "job_runs";
    pub const JOB_FAILURES: &str = "job_failures";
}

/// Destination for flushed counters.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one batch of counters.
    async fn send(&self, counters: &CounterSet) -> Result<()>;
}

/// What a single [`MetricsAggregator::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was recorded since the last flush; the sink was not called.
    Empty,
    /// This many distinct counters were delivered.
    Sent(usize),
}

/// Mutex-guarded counter set shared by request handlers and the flush task.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    counters: Mutex<CounterSet>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, n: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters.entry(name.to_string()).or_insert(0) += n;
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> CounterSet {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Send everything recorded so far and reset to empty.
    ///
    /// The set is taken out under the lock before sending, so increments that
    /// land during the send are kept for the next flush. If the sink fails
    /// the batch is merged back and the error is returned.
    pub async fn flush(&self, sink: &dyn TelemetrySink) -> Result<FlushOutcome> {
        let batch = {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *counters)
        };
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        match sink.send(&batch).await {
            Ok(()) => Ok(FlushOutcome::Sent(batch.len())),
            Err(e) => {
                let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
                for (name, n) in batch {
                    *counters.entry(name).or_insert(0) += n;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<CounterSet>>,
        fail: bool,
    }

    #[async_trait]
    impl TelemetrySink for Recorder {
        async fn send(&self, counters: &CounterSet) -> Result<()> {
            if self.fail {
                anyhow::bail!("collector unavailable");
            }
            self.batches.lock().unwrap().push(counters.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn flush_sends_totals_and_resets() {
        let agg = MetricsAggregator::new();
        for _ in 0..7 {
            agg.increment("x");
        }
        agg.increment("y");

        let sink = Recorder::default();
        assert_eq!(agg.flush(&sink).await.unwrap(), FlushOutcome::Sent(2));
        assert!(agg.is_empty());

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].get("x"), Some(&7));
        assert_eq!(batches[0].get("y"), Some(&1));
    }

    #[tokio::test]
    async fn empty_set_is_not_sent() {
        let agg = MetricsAggregator::new();
        let sink = Recorder::default();
        assert_eq!(agg.flush(&sink).await.unwrap(), FlushOutcome::Empty);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_flush_keeps_counters() {
        let agg = MetricsAggregator::new();
        agg.add("x", 3);
        let sink = Recorder {
            fail: true,
            ..Default::default()
        };
        assert!(agg.flush(&sink).await.is_err());
        agg.increment("x");
        assert_eq!(agg.snapshot().get("x"), Some(&4));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let agg = Arc::new(MetricsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        agg.increment(names::REQUESTS);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.snapshot().get(names::REQUESTS), Some(&8000));
    }
}
