//! Storage metrics.
//!
//! The manager reports a fixed set of [`Metric`] series through a
//! [`MetricsSink`]. Labels carry the tier, the operation and the failure kind.

use std::fmt;
use std::time::Instant;

use dashmap::DashMap;

pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Series emitted by the storage manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Local tier chosen at construction, labelled `tier`
    TierSelected,
    /// Accepted writes, labelled with the `tier` that took them
    Writes,
    /// Answered reads, labelled with the `tier` that answered
    Reads,
    /// Tier skips, labelled `op` and `from`
    Fallbacks,
    /// Remote failures, labelled with the failure `kind`
    RemoteErrors,
    /// Remote round-trip time, labelled `op`
    RemoteDuration,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Self::TierSelected => "storage_tier_selected_total",
            Self::Writes => "storage_writes_total",
            Self::Reads => "storage_reads_total",
            Self::Fallbacks => "storage_fallbacks_total",
            Self::RemoteErrors => "storage_remote_errors_total",
            Self::RemoteDuration => "storage_remote_duration_ms",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, metric: Metric, labels: Labels<'_>);
    fn observe_duration_ms(&self, metric: Metric, duration_ms: u64, labels: Labels<'_>);
}

#[derive(Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _metric: Metric, _labels: Labels<'_>) {}

    fn observe_duration_ms(&self, _metric: Metric, _duration_ms: u64, _labels: Labels<'_>) {}
}

/// Accumulated timings of one series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DurationStats {
    pub count: u64,
    pub total_ms: u64,
}

/// Sink that keeps every series in memory, for tests and diagnostics.
#[derive(Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, u64>,
    durations: DashMap<String, DurationStats>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, metric: Metric, labels: Labels<'_>) -> u64 {
        self.counters
            .get(&series_key(metric, labels))
            .map_or(0, |v| *v)
    }

    pub fn duration(&self, metric: Metric, labels: Labels<'_>) -> DurationStats {
        self.durations
            .get(&series_key(metric, labels))
            .map(|v| *v)
            .unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr_counter(&self, metric: Metric, labels: Labels<'_>) {
        *self.counters.entry(series_key(metric, labels)).or_default() += 1;
    }

    fn observe_duration_ms(&self, metric: Metric, duration_ms: u64, labels: Labels<'_>) {
        let mut stats = self.durations.entry(series_key(metric, labels)).or_default();
        stats.count += 1;
        stats.total_ms = stats.total_ms.saturating_add(duration_ms);
    }
}

/// `name{k=v,...}` with labels sorted, so label order at the call site does not matter.
fn series_key(metric: Metric, labels: Labels<'_>) -> String {
    if labels.is_empty() {
        return metric.name().to_string();
    }
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort_unstable();
    format!("{}{{{}}}", metric.name(), pairs.join(","))
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
