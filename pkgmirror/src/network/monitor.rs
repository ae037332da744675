//! Run-wide network health monitor.
//!
//! Every registry request goes through [`NetworkHealthMonitor::acquire`] and
//! reports its outcome through the returned [`NetworkPermit`]. The monitor
//! keeps a rolling window of samples, periodically reclassifies network speed,
//! and hosts the circuit breaker.
//!
//! # Thread Safety
//!
//! All state lives behind one `parking_lot::Mutex`, so concurrent sample
//! submissions from many fetch tasks are never lost and breaker transitions
//! are observed consistently. The lock is held only for O(1) updates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::speed::NetworkSpeed;
use super::window::{NetworkSample, RollingWindow, DEFAULT_WINDOW_SIZE};
use crate::fetch::{FetchError, FetchResult};

/// Default number of samples between metric recomputations.
pub const DEFAULT_RECOMPUTE_INTERVAL: u64 = 20;

/// Concurrency cap applied while the circuit is open.
pub const OPEN_CIRCUIT_CONCURRENCY: usize = 2;

/// Poll interval while waiting for an outstanding probe to resolve.
pub const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for the network health monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Rolling window size (default: 100).
    pub window_size: usize,
    /// Recompute metrics every N samples (default: 20).
    pub recompute_interval: u64,
    /// Circuit breaker settings.
    pub breaker: CircuitBreakerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            recompute_interval: DEFAULT_RECOMPUTE_INTERVAL,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Set the breaker cooldown (builder pattern).
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker.cooldown = cooldown;
        self
    }
}

/// Metrics computed at the last recomputation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkMetrics {
    /// Mean latency over the window.
    pub average_latency_ms: f64,
    /// Failed fraction of the window.
    pub error_rate: f64,
    /// Speed classification derived from the two values above.
    pub speed: NetworkSpeed,
    /// Samples in the window when computed.
    pub window_samples: usize,
}

#[derive(Debug)]
struct MonitorInner {
    window: RollingWindow,
    breaker: CircuitBreaker,
    total_samples: u64,
    /// Samples observed since the breaker last closed; the trip condition
    /// counts these so a freshly closed breaker needs new evidence to reopen.
    samples_since_close: u64,
    metrics: Option<NetworkMetrics>,
}

/// Tracks network health for one run.
///
/// Create one per run and share it by `Arc` with every component that makes
/// network requests.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use pkgmirror::network::NetworkHealthMonitor;
///
/// let monitor = Arc::new(NetworkHealthMonitor::with_defaults());
///
/// let permit = monitor.acquire().expect("circuit is closed");
/// // ... perform the request ...
/// permit.finish(false);
///
/// assert_eq!(monitor.total_samples(), 1);
/// assert_eq!(monitor.adaptive_concurrency(30), 30);
/// ```
#[derive(Debug)]
pub struct NetworkHealthMonitor {
    config: MonitorConfig,
    inner: Mutex<MonitorInner>,
}

impl NetworkHealthMonitor {
    /// Create a monitor with the given configuration.
    pub fn new(config: MonitorConfig) -> Self {
        let inner = MonitorInner {
            window: RollingWindow::new(config.window_size),
            breaker: CircuitBreaker::new(config.breaker.clone()),
            total_samples: 0,
            samples_since_close: 0,
            metrics: None,
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Create a monitor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MonitorConfig::default())
    }

    /// Ask for permission to make a network request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::CircuitOpen`] without touching the network while
    /// the circuit is open, or while the half-open probe is outstanding.
    pub fn acquire(self: &Arc<Self>) -> FetchResult<NetworkPermit> {
        let admission = self.inner.lock().breaker.try_admit(Instant::now());
        match admission {
            Admission::Admitted => Ok(NetworkPermit::new(Arc::clone(self), false)),
            Admission::Probe => Ok(NetworkPermit::new(Arc::clone(self), true)),
            Admission::Rejected => Err(FetchError::CircuitOpen),
        }
    }

    /// Record the outcome of one network response.
    pub fn record_sample(&self, latency_ms: u64, failed: bool) {
        self.record(latency_ms, failed, false);
    }

    fn record(&self, latency_ms: u64, failed: bool, probe: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.window.push(NetworkSample::now(latency_ms, failed));
        inner.total_samples += 1;
        inner.samples_since_close += 1;

        if inner.total_samples % self.config.recompute_interval.max(1) == 0 {
            let average_latency_ms = inner.window.average_latency_ms();
            let error_rate = inner.window.error_rate();
            let speed = NetworkSpeed::classify(average_latency_ms, error_rate);
            if inner.metrics.map(|m| m.speed) != Some(speed) {
                tracing::info!(
                    speed = %speed,
                    average_latency_ms = format!("{:.0}", average_latency_ms),
                    error_rate = format!("{:.1}%", error_rate * 100.0),
                    "Network speed reclassified"
                );
            }
            inner.metrics = Some(NetworkMetrics {
                average_latency_ms,
                error_rate,
                speed,
                window_samples: inner.window.len(),
            });
        }

        if probe {
            if inner.breaker.record_probe(!failed, now) == CircuitState::Closed {
                inner.window.clear();
                inner.samples_since_close = 0;
            }
            return;
        }

        let error_rate = inner.window.error_rate();
        let observed = inner.samples_since_close;
        inner.breaker.evaluate(error_rate, observed, now);
    }

    fn abandon_probe(&self) {
        let mut inner = self.inner.lock();
        inner.breaker.record_probe(false, Instant::now());
    }

    /// Current circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.lock().breaker.state()
    }

    /// Whether the circuit is open or half-open.
    pub fn is_circuit_open(&self) -> bool {
        self.inner.lock().breaker.is_open()
    }

    /// How long an acquisition made now would have to wait.
    ///
    /// `None` when the next acquisition is admitted (closed circuit, or an
    /// open one whose cooldown has elapsed). While the probe is outstanding
    /// this is [`PROBE_POLL_INTERVAL`].
    pub fn admission_delay(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.breaker.is_probing() {
            return Some(PROBE_POLL_INTERVAL);
        }
        inner
            .breaker
            .cooldown_remaining(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }

    /// Wait until the breaker would admit an acquisition.
    ///
    /// Returns `false` if `cancel` fired first. The next acquisition may still
    /// be refused when another task takes the probe in the meantime.
    pub async fn wait_for_admission(&self, cancel: &CancellationToken) -> bool {
        while let Some(delay) = self.admission_delay() {
            tracing::debug!(
                wait_ms = delay.as_millis() as u64,
                state = self.circuit_state().display_status(),
                "Waiting for circuit breaker"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        !cancel.is_cancelled()
    }

    /// Metrics from the last recomputation, if any.
    pub fn metrics(&self) -> Option<NetworkMetrics> {
        self.inner.lock().metrics
    }

    /// Current speed class, if one has been computed yet.
    pub fn speed(&self) -> Option<NetworkSpeed> {
        self.metrics().map(|m| m.speed)
    }

    /// Total samples recorded during this run.
    pub fn total_samples(&self) -> u64 {
        self.inner.lock().total_samples
    }

    /// Live error rate over the rolling window.
    pub fn window_error_rate(&self) -> f64 {
        self.inner.lock().window.error_rate()
    }

    /// Scale a requested concurrency to current network health.
    ///
    /// Unknown speed leaves `base` unchanged; an open circuit clamps the
    /// result to [`OPEN_CIRCUIT_CONCURRENCY`].
    pub fn adaptive_concurrency(&self, base: usize) -> usize {
        let inner = self.inner.lock();
        let base = base.max(1);
        let scaled = match inner.metrics {
            Some(metrics) => metrics.speed.scale(base),
            None => base,
        };
        if inner.breaker.is_open() {
            scaled.min(OPEN_CIRCUIT_CONCURRENCY)
        } else {
            scaled
        }
    }
}

impl Default for NetworkHealthMonitor {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Permission to make one network request.
///
/// Call [`finish`](Self::finish) once the response (or failure) is known; the
/// elapsed time becomes the sample latency. A probe permit dropped without
/// finishing counts as a failed probe so the breaker never stays half-open.
#[derive(Debug)]
pub struct NetworkPermit {
    monitor: Arc<NetworkHealthMonitor>,
    probe: bool,
    started: Instant,
    finished: bool,
}

impl NetworkPermit {
    fn new(monitor: Arc<NetworkHealthMonitor>, probe: bool) -> Self {
        Self {
            monitor,
            probe,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Whether this permit is the half-open recovery probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Record the outcome and release the permit.
    pub fn finish(mut self, failed: bool) {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        self.finished = true;
        self.monitor.record(latency_ms, failed, self.probe);
    }
}

impl Drop for NetworkPermit {
    fn drop(&mut self) {
        if self.probe && !self.finished {
            self.monitor.abandon_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn monitor_with_cooldown(ms: u64) -> Arc<NetworkHealthMonitor> {
        Arc::new(NetworkHealthMonitor::new(
            MonitorConfig::default().with_cooldown(Duration::from_millis(ms)),
        ))
    }

    fn trip(monitor: &NetworkHealthMonitor) {
        for i in 0..21 {
            monitor.record_sample(100, i % 2 == 0 || i == 1);
        }
    }

    #[test]
    fn test_initial_state() {
        let monitor = NetworkHealthMonitor::with_defaults();
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);
        assert!(monitor.metrics().is_none());
        assert!(monitor.speed().is_none());
        assert_eq!(monitor.adaptive_concurrency(30), 30);
    }

    #[test]
    fn test_metrics_recomputed_every_twentieth_sample() {
        let monitor = NetworkHealthMonitor::with_defaults();
        for _ in 0..19 {
            monitor.record_sample(100, false);
        }
        assert!(monitor.metrics().is_none());

        monitor.record_sample(100, false);
        let metrics = monitor.metrics().unwrap();
        assert_eq!(metrics.speed, NetworkSpeed::Fast);
        assert_eq!(metrics.window_samples, 20);
        assert_eq!(metrics.average_latency_ms, 100.0);
    }

    #[test]
    fn test_metrics_not_refreshed_between_intervals() {
        let monitor = NetworkHealthMonitor::with_defaults();
        for _ in 0..20 {
            monitor.record_sample(100, false);
        }
        for _ in 0..5 {
            monitor.record_sample(9000, false);
        }
        assert_eq!(monitor.speed(), Some(NetworkSpeed::Fast));
    }

    #[test]
    fn test_slow_network_scales_down() {
        let monitor = NetworkHealthMonitor::with_defaults();
        for _ in 0..20 {
            monitor.record_sample(6000, false);
        }
        assert_eq!(monitor.speed(), Some(NetworkSpeed::Slow));
        assert_eq!(monitor.adaptive_concurrency(30), 6);
        assert_eq!(monitor.adaptive_concurrency(10), 3);
    }

    #[test]
    fn test_medium_network_scales_down() {
        let monitor = NetworkHealthMonitor::with_defaults();
        for _ in 0..20 {
            monitor.record_sample(3000, false);
        }
        assert_eq!(monitor.adaptive_concurrency(30), 15);
    }

    #[test]
    fn test_breaker_opens_after_21_mostly_failed_samples() {
        let monitor = monitor_with_cooldown(60_000);
        trip(&monitor);
        assert!(monitor.window_error_rate() > 0.5);
        assert_eq!(monitor.circuit_state(), CircuitState::Open);
    }

    #[test]
    fn test_breaker_stays_closed_at_twenty_samples() {
        let monitor = monitor_with_cooldown(60_000);
        for _ in 0..20 {
            monitor.record_sample(100, true);
        }
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);
        monitor.record_sample(100, true);
        assert_eq!(monitor.circuit_state(), CircuitState::Open);
    }

    #[test]
    fn test_open_circuit_fails_fast_and_clamps_concurrency() {
        let monitor = monitor_with_cooldown(60_000);
        trip(&monitor);

        let samples_before = monitor.total_samples();
        assert!(matches!(monitor.acquire(), Err(FetchError::CircuitOpen)));
        assert_eq!(monitor.total_samples(), samples_before);
        assert!(monitor.adaptive_concurrency(30) <= OPEN_CIRCUIT_CONCURRENCY);
    }

    #[test]
    fn test_exactly_one_probe_after_cooldown() {
        let monitor = monitor_with_cooldown(30);
        trip(&monitor);

        thread::sleep(Duration::from_millis(40));
        let probe = monitor.acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(monitor.circuit_state(), CircuitState::HalfOpen);
        assert!(matches!(monitor.acquire(), Err(FetchError::CircuitOpen)));

        probe.finish(false);
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);
        let normal = monitor.acquire().unwrap();
        assert!(!normal.is_probe());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let monitor = monitor_with_cooldown(30);
        trip(&monitor);

        thread::sleep(Duration::from_millis(40));
        monitor.acquire().unwrap().finish(true);
        assert_eq!(monitor.circuit_state(), CircuitState::Open);
        assert!(matches!(monitor.acquire(), Err(FetchError::CircuitOpen)));
    }

    #[test]
    fn test_abandoned_probe_reopens() {
        let monitor = monitor_with_cooldown(30);
        trip(&monitor);

        thread::sleep(Duration::from_millis(40));
        drop(monitor.acquire().unwrap());
        assert_eq!(monitor.circuit_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_wait_for_admission_outlasts_cooldown() {
        let monitor = monitor_with_cooldown(40);
        assert_eq!(monitor.admission_delay(), None);
        trip(&monitor);
        assert!(monitor.admission_delay().is_some());

        let cancel = CancellationToken::new();
        assert!(monitor.wait_for_admission(&cancel).await);
        assert_eq!(monitor.admission_delay(), None);
        assert!(monitor.acquire().unwrap().is_probe());
    }

    #[tokio::test]
    async fn test_wait_for_admission_observes_cancellation() {
        let monitor = monitor_with_cooldown(60_000);
        trip(&monitor);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!monitor.wait_for_admission(&cancel).await);
    }

    #[test]
    fn test_closed_breaker_needs_fresh_evidence() {
        let monitor = monitor_with_cooldown(10);
        trip(&monitor);
        thread::sleep(Duration::from_millis(20));
        monitor.acquire().unwrap().finish(false);
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);

        // A few failures right after closing must not reopen immediately.
        for _ in 0..5 {
            monitor.record_sample(100, true);
        }
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn test_concurrent_sample_submission() {
        let monitor = Arc::new(NetworkHealthMonitor::with_defaults());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    for _ in 0..50 {
                        monitor.record_sample(10, false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(monitor.total_samples(), 400);
        assert_eq!(monitor.circuit_state(), CircuitState::Closed);
    }
}
