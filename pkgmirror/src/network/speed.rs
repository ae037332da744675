//! Network speed classification and concurrency scaling.

use std::fmt;

/// Average latency above which the network is considered slow.
pub const SLOW_LATENCY_MS: f64 = 5000.0;

/// Average latency below which the network may be considered fast.
pub const FAST_LATENCY_MS: f64 = 2000.0;

/// Error rate above which the network is considered slow.
pub const SLOW_ERROR_RATE: f64 = 0.3;

/// Error rate below which the network may be considered fast.
pub const FAST_ERROR_RATE: f64 = 0.15;

/// Observed network speed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSpeed {
    /// Low latency, few errors.
    Fast,
    /// Neither fast nor slow.
    Medium,
    /// High latency or many errors.
    Slow,
}

impl NetworkSpeed {
    /// Classify from average latency and error rate.
    pub fn classify(average_latency_ms: f64, error_rate: f64) -> Self {
        if average_latency_ms > SLOW_LATENCY_MS || error_rate > SLOW_ERROR_RATE {
            NetworkSpeed::Slow
        } else if average_latency_ms < FAST_LATENCY_MS && error_rate < FAST_ERROR_RATE {
            NetworkSpeed::Fast
        } else {
            NetworkSpeed::Medium
        }
    }

    /// Scale a requested concurrency for this speed class.
    ///
    /// Slow keeps ~20% (at least 3), medium ~50% (at least 5), fast ~80%.
    /// The result never exceeds `base` and is at least 1.
    pub fn scale(&self, base: usize) -> usize {
        let base = base.max(1);
        let (fraction, floor) = match self {
            NetworkSpeed::Slow => (0.2, 3),
            NetworkSpeed::Medium => (0.5, 5),
            NetworkSpeed::Fast => (0.8, 1),
        };
        ((base as f64 * fraction) as usize).max(floor).min(base)
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkSpeed::Fast => "fast",
            NetworkSpeed::Medium => "medium",
            NetworkSpeed::Slow => "slow",
        }
    }
}

impl fmt::Display for NetworkSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_slow() {
        assert_eq!(NetworkSpeed::classify(6000.0, 0.0), NetworkSpeed::Slow);
        assert_eq!(NetworkSpeed::classify(100.0, 0.31), NetworkSpeed::Slow);
    }

    #[test]
    fn test_classify_fast() {
        assert_eq!(NetworkSpeed::classify(500.0, 0.1), NetworkSpeed::Fast);
    }

    #[test]
    fn test_classify_medium() {
        assert_eq!(NetworkSpeed::classify(3000.0, 0.0), NetworkSpeed::Medium);
        assert_eq!(NetworkSpeed::classify(500.0, 0.2), NetworkSpeed::Medium);
        // Boundaries are exclusive on both sides.
        assert_eq!(NetworkSpeed::classify(2000.0, 0.0), NetworkSpeed::Medium);
        assert_eq!(NetworkSpeed::classify(5000.0, 0.3), NetworkSpeed::Medium);
    }

    #[test]
    fn test_scale() {
        assert_eq!(NetworkSpeed::Slow.scale(30), 6);
        assert_eq!(NetworkSpeed::Medium.scale(30), 15);
        assert_eq!(NetworkSpeed::Fast.scale(30), 24);
    }

    #[test]
    fn test_scale_floors() {
        assert_eq!(NetworkSpeed::Slow.scale(10), 3);
        assert_eq!(NetworkSpeed::Medium.scale(8), 5);
        assert_eq!(NetworkSpeed::Fast.scale(1), 1);
    }

    #[test]
    fn test_scale_never_exceeds_base() {
        assert_eq!(NetworkSpeed::Slow.scale(2), 2);
        assert_eq!(NetworkSpeed::Medium.scale(4), 4);
        assert_eq!(NetworkSpeed::Fast.scale(0), 1);
    }
}
