//! Outcome counters for the submission job.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Prefix for every counter the submission job emits.
pub const DEFAULT_METRICS_PREFIX: &str = "worker.lighthouse.submit_benefits_intake_claim";

/// Receives counter increments keyed by dotted metric name.
pub trait StatsSink: Send + Sync {
    fn increment(&self, key: &str);
}

/// Counts events in a Prometheus registry, one series per key under the
/// `key` label.
pub struct PrometheusStats {
    registry: Registry,
    events: CounterVec,
}

impl PrometheusStats {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let events = CounterVec::new(
            Opts::new(
                "benefits_intake_job_events_total",
                "Submission job outcomes by metric key",
            ),
            &["key"],
        )?;
        registry.register(Box::new(events.clone()))?;
        Ok(Self { registry, events })
    }

    pub fn count(&self, key: &str) -> u64 {
        self.events.with_label_values(&[key]).get() as u64
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl StatsSink for PrometheusStats {
    fn increment(&self, key: &str) {
        self.events.with_label_values(&[key]).inc();
    }
}

/// Records counts in memory.
#[derive(Debug, Default)]
pub struct InMemoryStats {
    counts: Mutex<HashMap<String, u64>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts
            .lock()
            .map(|c| c.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl StatsSink for InMemoryStats {
    fn increment(&self, key: &str) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }
}

/// Metric keys derived from one prefix.
#[derive(Debug, Clone)]
pub struct StatKeys {
    prefix: String,
}

impl StatKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn success(&self) -> String {
        format!("{}.success", self.prefix)
    }

    pub fn failure(&self) -> String {
        format!("{}.failure", self.prefix)
    }

    pub fn retry(&self) -> String {
        format!("{}.retry", self.prefix)
    }

    pub fn exhausted(&self) -> String {
        format!("{}.exhausted", self.prefix)
    }
}
