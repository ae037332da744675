//! Network health monitoring and circuit breaking.
//!
//! One [`NetworkHealthMonitor`] is shared by every network call in a run.
//!
//! ```text
//!   fetch task ──acquire()──► NetworkHealthMonitor ──► CircuitBreaker
//!        │                          │
//!        │   NetworkPermit          ├── RollingWindow (last 100 samples)
//!        └──finish(failed)─────────►└── NetworkSpeed (every 20th sample)
//! ```
//!
//! The monitor also answers [`NetworkHealthMonitor::adaptive_concurrency`],
//! which the fetch engine uses to size its semaphore per batch.

mod circuit_breaker;
mod monitor;
mod speed;
mod window;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, DEFAULT_COOLDOWN,
    DEFAULT_ERROR_THRESHOLD, DEFAULT_MIN_SAMPLES,
};
pub use monitor::{
    MonitorConfig, NetworkHealthMonitor, NetworkMetrics, NetworkPermit,
    DEFAULT_RECOMPUTE_INTERVAL, OPEN_CIRCUIT_CONCURRENCY, PROBE_POLL_INTERVAL,
};
pub use speed::NetworkSpeed;
pub use window::{NetworkSample, RollingWindow, DEFAULT_WINDOW_SIZE};
