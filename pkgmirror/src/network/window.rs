//! Bounded rolling window of network samples.

use std::collections::VecDeque;

/// Default number of samples kept in the rolling window.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Outcome of one network response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSample {
    /// Wall-clock time the response completed (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Time from request start to response.
    pub latency_ms: u64,
    /// Whether the request failed at the network level.
    pub failed: bool,
}

impl NetworkSample {
    /// Create a sample stamped with the current time.
    pub fn now(latency_ms: u64, failed: bool) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            latency_ms,
            failed,
        }
    }
}

/// Ring buffer of the most recent samples with running aggregates.
///
/// Sums are maintained incrementally so aggregate queries are O(1).
#[derive(Debug)]
pub struct RollingWindow {
    samples: VecDeque<NetworkSample>,
    capacity: usize,
    failures: usize,
    latency_sum: u64,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
            latency_sum: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: NetworkSample) {
        if self.samples.len() == self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.forget(&evicted);
            }
        }
        if sample.failed {
            self.failures += 1;
        }
        self.latency_sum += sample.latency_ms;
        self.samples.push_back(sample);
    }

    fn forget(&mut self, sample: &NetworkSample) {
        if sample.failed {
            self.failures -= 1;
        }
        self.latency_sum -= sample.latency_ms;
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Failed samples divided by samples in the window (0.0 when empty).
    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.samples.len() as f64
        }
    }

    /// Mean latency across the window in milliseconds (0.0 when empty).
    pub fn average_latency_ms(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.latency_sum as f64 / self.samples.len() as f64
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&NetworkSample> {
        self.samples.back()
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.failures = 0;
        self.latency_sum = 0;
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
