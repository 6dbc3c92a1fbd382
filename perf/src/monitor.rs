//! Named timing marks.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Below this an operation is considered fast.
pub const FAST_THRESHOLD: Duration = Duration::from_millis(100);
/// Below this (and above [`FAST_THRESHOLD`]) an operation is slow; above it, critical.
pub const SLOW_THRESHOLD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingTier {
    Fast,
    Slow,
    Critical,
}

impl TimingTier {
    #[must_use]
    pub fn of(duration: Duration) -> Self {
        if duration < FAST_THRESHOLD {
            Self::Fast
        } else if duration < SLOW_THRESHOLD {
            Self::Slow
        } else {
            Self::Critical
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
            Self::Critical => "critical",
        }
    }
}

/// Table of in-flight marks keyed by caller-chosen labels.
///
/// Starting a label that is already running overwrites it; there is no nesting.
#[derive(Debug, Default)]
pub struct PerfMonitor {
    marks: Mutex<HashMap<String, Instant>>,
}

impl PerfMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, label: impl Into<String>) {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label.into(), Instant::now());
    }

    /// Finish `label` and log the elapsed time.
    pub fn end(&self, label: &str) -> Duration {
        self.end_with(label, true)
    }

    /// Finish `label`. Returns zero (and warns) when it was never started.
    pub fn end_with(&self, label: &str, log: bool) -> Duration {
        let started = self
            .marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(label);

        let Some(started) = started else {
            tracing::warn!(label, "No start mark found");
            return Duration::ZERO;
        };

        let duration = started.elapsed();
        if log {
            log_timing(label, duration);
        }
        duration
    }

    #[must_use]
    pub fn is_running(&self, label: &str) -> bool {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(label)
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.marks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn log_timing(label: &str, duration: Duration) {
    let duration_ms = duration.as_secs_f64() * 1000.0;
    let tier = TimingTier::of(duration);
    match tier {
        TimingTier::Fast => {
            tracing::info!(label, duration_ms, tier = tier.as_str(), "{label}: {duration_ms:.2}ms");
        }
        TimingTier::Slow => {
            tracing::warn!(label, duration_ms, tier = tier.as_str(), "{label}: {duration_ms:.2}ms");
        }
        TimingTier::Critical => {
            tracing::error!(label, duration_ms, tier = tier.as_str(), "{label}: {duration_ms:.2}ms");
        }
    }
}

/// Process-wide monitor.
pub fn perf_monitor() -> &'static PerfMonitor {
    static MONITOR: OnceLock<PerfMonitor> = OnceLock::new();
    MONITOR.get_or_init(PerfMonitor::new)
}
