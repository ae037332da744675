//! Circuit breaker protecting a run from a degraded network.
//!
//! # State Machine
//!
//! ```text
//! Closed --[error rate > 50% with > 20 samples]--> Open
//! Open --[cooldown elapsed, next acquisition]--> HalfOpen (one probe admitted)
//! HalfOpen --[probe succeeds]--> Closed
//! HalfOpen --[probe fails or is abandoned]--> Open (fresh cooldown)
//! ```
//!
//! The breaker itself holds no lock. [`NetworkHealthMonitor`] owns it behind
//! its own mutex together with the sample window, so trip decisions and
//! sample recording are observed atomically.
//!
//! [`NetworkHealthMonitor`]: super::NetworkHealthMonitor

use std::time::{Duration, Instant};

/// Default error rate above which the circuit opens.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.5;

/// Default number of samples that must be exceeded before the circuit may open.
pub const DEFAULT_MIN_SAMPLES: u64 = 20;

/// Default time the circuit stays open before admitting a probe.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Error rate that trips the circuit (default: 0.5).
    pub error_threshold: f64,
    /// Samples that must be exceeded before tripping (default: 20).
    pub min_samples: u64,
    /// Cooldown before a probe is admitted (default: 60s).
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            min_samples: DEFAULT_MIN_SAMPLES,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the cooldown (builder pattern).
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are refused until the cooldown elapses.
    Open,
    /// A single probe request is testing recovery.
    HalfOpen,
}

impl CircuitState {
    /// User-friendly status for progress displays.
    pub fn display_status(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Healthy",
            CircuitState::Open => "Paused",
            CircuitState::HalfOpen => "Probing...",
        }
    }
}

/// Result of asking the breaker for permission to make a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal request.
    Admitted,
    /// The single recovery probe.
    Probe,
    /// Refused; the circuit is open.
    Rejected,
}

/// Circuit breaker state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// When the circuit last opened.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Configuration in use.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a new request may proceed.
    pub fn try_admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Admitted,
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .map(|opened| now.duration_since(opened) >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    tracing::info!("Circuit breaker half-open, admitting probe request");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    Admission::Rejected
                } else {
                    self.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Evaluate the trip condition. Only a closed circuit can trip.
    ///
    /// Returns `true` if this call opened the circuit.
    pub fn evaluate(&mut self, error_rate: f64, samples_observed: u64, now: Instant) -> bool {
        if self.state != CircuitState::Closed {
            return false;
        }
        if samples_observed > self.config.min_samples && error_rate > self.config.error_threshold
        {
            self.open(now);
            tracing::warn!(
                error_rate = format!("{:.1}%", error_rate * 100.0),
                samples = samples_observed,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit breaker OPENED, network acquisitions paused"
            );
            return true;
        }
        false
    }

    /// Resolve the outstanding probe.
    ///
    /// Returns the new state.
    pub fn record_probe(&mut self, success: bool, now: Instant) -> CircuitState {
        if self.state != CircuitState::HalfOpen {
            return self.state;
        }
        self.probe_in_flight = false;
        if success {
            self.state = CircuitState::Closed;
            self.opened_at = None;
            tracing::info!("Circuit breaker CLOSED, probe succeeded");
        } else {
            self.open(now);
            tracing::warn!("Circuit breaker re-opened, probe failed");
        }
        self.state
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    /// Whether the circuit is refusing or restricting traffic.
    pub fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open | CircuitState::HalfOpen)
    }

    /// Whether the half-open probe is outstanding.
    pub fn is_probing(&self) -> bool {
        self.state == CircuitState::HalfOpen && self.probe_in_flight
    }

    /// Time left before an open circuit admits its probe.
    ///
    /// `None` unless the circuit is open; zero once the cooldown has elapsed.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed = self
            .opened_at
            .map(|opened| now.duration_since(opened))
            .unwrap_or(self.config.cooldown);
        Some(self.config.cooldown.saturating_sub(elapsed))
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::default().with_cooldown(Duration::from_millis(cooldown_ms)),
        )
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.error_threshold, 0.5);
        assert_eq!(config.min_samples, 20);
        assert_eq!(config.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_initial_state() {
        let mut cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.is_open());
        assert_eq!(cb.try_admit(Instant::now()), Admission::Admitted);
    }

    #[test]
    fn test_requires_more_than_min_samples() {
        let mut cb = breaker(1000);
        let now = Instant::now();
        assert!(!cb.evaluate(1.0, 20, now));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.evaluate(1.0, 21, now));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut cb = breaker(1000);
        assert!(!cb.evaluate(0.5, 100, Instant::now()));
        assert!(cb.evaluate(0.51, 100, Instant::now()));
    }

    #[test]
    fn test_open_rejects_until_cooldown() {
        let mut cb = breaker(100);
        let opened = Instant::now();
        cb.evaluate(1.0, 30, opened);

        assert_eq!(cb.try_admit(opened), Admission::Rejected);
        assert_eq!(
            cb.try_admit(opened + Duration::from_millis(50)),
            Admission::Rejected
        );
        assert_eq!(
            cb.try_admit(opened + Duration::from_millis(100)),
            Admission::Probe
        );
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let mut cb = breaker(0);
        let now = Instant::now();
        cb.evaluate(1.0, 30, now);

        assert_eq!(cb.try_admit(now), Admission::Probe);
        assert_eq!(cb.try_admit(now), Admission::Rejected);
        assert_eq!(cb.try_admit(now), Admission::Rejected);
    }

    #[test]
    fn test_probe_success_closes() {
        let mut cb = breaker(0);
        let now = Instant::now();
        cb.evaluate(1.0, 30, now);
        cb.try_admit(now);

        assert_eq!(cb.record_probe(true, now), CircuitState::Closed);
        assert!(cb.opened_at().is_none());
        assert_eq!(cb.try_admit(now), Admission::Admitted);
    }

    #[test]
    fn test_probe_failure_reopens_with_fresh_timer() {
        let mut cb = breaker(100);
        let start = Instant::now();
        cb.evaluate(1.0, 30, start);

        let probe_time = start + Duration::from_millis(150);
        assert_eq!(cb.try_admit(probe_time), Admission::Probe);
        assert_eq!(cb.record_probe(false, probe_time), CircuitState::Open);
        assert_eq!(cb.opened_at(), Some(probe_time));

        // Old timer would have allowed a probe here; the fresh one does not.
        assert_eq!(
            cb.try_admit(probe_time + Duration::from_millis(50)),
            Admission::Rejected
        );
    }

    #[test]
    fn test_open_circuit_does_not_retrip() {
        let mut cb = breaker(1000);
        let now = Instant::now();
        assert!(cb.evaluate(1.0, 30, now));
        assert!(!cb.evaluate(1.0, 31, now + Duration::from_millis(10)));
        assert_eq!(cb.opened_at(), Some(now));
    }

    #[test]
    fn test_cooldown_remaining() {
        let mut cb = breaker(100);
        let opened = Instant::now();
        assert_eq!(cb.cooldown_remaining(opened), None);

        cb.evaluate(1.0, 30, opened);
        assert_eq!(
            cb.cooldown_remaining(opened + Duration::from_millis(40)),
            Some(Duration::from_millis(60))
        );
        assert_eq!(
            cb.cooldown_remaining(opened + Duration::from_millis(500)),
            Some(Duration::ZERO)
        );

        assert_eq!(cb.try_admit(opened + Duration::from_millis(100)), Admission::Probe);
        assert!(cb.is_probing());
        assert_eq!(cb.cooldown_remaining(opened), None);
    }

    #[test]
    fn test_display_status() {
        assert_eq!(CircuitState::Closed.display_status(), "Healthy");
        assert_eq!(CircuitState::Open.display_status(), "Paused");
        assert_eq!(CircuitState::HalfOpen.display_status(), "Probing...");
    }
}
