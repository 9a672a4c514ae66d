//! Per-MCP circuit breaker transitions (spec §4.5), adapted from the
//! corpus's synchronous breaker-wrapper pattern to operate directly on the
//! shared [`BreakerCounters`] under the registry's per-entry lock, rather
//! than wrapping a call with its own mutex.

use coordinator_core::model::{BreakerCounters, BreakerState};

/// Tuning knobs, all with the spec's defaults.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub window_secs: f64,
    pub cooldown_secs: f64,
    pub cooldown_cap_secs: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 60.0,
            cooldown_secs: 30.0,
            cooldown_cap_secs: 300.0,
        }
    }
}

/// Re-evaluate whether `breaker` allows selection right now, transitioning
/// `Open -> HalfOpen` in place once the cooldown has elapsed (spec: "when
/// now >= open_until, transition half_open"). Must be called with the
/// registry entry's write lock held.
pub fn refresh_for_selection(breaker: &mut BreakerCounters, now: f64) -> bool {
    match breaker.state {
        BreakerState::Closed | BreakerState::HalfOpen => true,
        BreakerState::Open => {
            if now >= breaker.open_until {
                breaker.state = BreakerState::HalfOpen;
                true
            } else {
                false
            }
        }
    }
}

/// Fold a dispatch success into the breaker. A successful half-open probe
/// closes the breaker and resets counters; a success while closed just
/// resets the consecutive-failure counter.
pub fn record_success(breaker: &mut BreakerCounters) {
    breaker.state = BreakerState::Closed;
    breaker.consecutive_failures = 0;
    breaker.cooldown_secs = 0.0;
}

/// Fold a dispatch failure into the breaker (spec §4.5).
///
/// - `Closed`: increment the consecutive-failure counter (resetting it if
///   the failure window has lapsed); trip to `Open` at `failure_threshold`.
/// - `HalfOpen`: a failed probe reopens the breaker and doubles the
///   cooldown, capped at `cooldown_cap_secs`.
pub fn record_failure(breaker: &mut BreakerCounters, now: f64, config: &BreakerConfig) {
    match breaker.state {
        BreakerState::Closed => {
            if now - breaker.window_start > config.window_secs {
                breaker.window_start = now;
                breaker.consecutive_failures = 0;
            }
            breaker.consecutive_failures += 1;
            if breaker.consecutive_failures >= config.failure_threshold {
                trip_open(breaker, now, config.cooldown_secs, config.cooldown_cap_secs);
            }
        }
        BreakerState::HalfOpen => {
            let doubled = (breaker.cooldown_secs * 2.0).max(config.cooldown_secs);
            trip_open(breaker, now, doubled, config.cooldown_cap_secs);
        }
        BreakerState::Open => {
            // Already open; nothing further to record.
        }
    }
}

fn trip_open(breaker: &mut BreakerCounters, now: f64, cooldown_secs: f64, cap_secs: f64) {
    let cooldown = cooldown_secs.min(cap_secs);
    breaker.state = BreakerState::Open;
    breaker.cooldown_secs = cooldown;
    breaker.open_until = now + cooldown;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> BreakerCounters {
        BreakerCounters::default()
    }

    #[test]
    fn opens_at_exactly_n_failures_not_n_minus_1() {
        let config = BreakerConfig::default();
        let mut b = fresh();
        for i in 0..config.failure_threshold - 1 {
            record_failure(&mut b, i as f64, &config);
            assert_eq!(b.state, BreakerState::Closed);
        }
        record_failure(&mut b, 4.0, &config);
        assert_eq!(b.state, BreakerState::Open);
    }

    #[test]
    fn open_breaker_blocks_until_cooldown_elapses() {
        let config = BreakerConfig::default();
        let mut b = fresh();
        for i in 0..config.failure_threshold {
            record_failure(&mut b, i as f64, &config);
        }
        assert!(!refresh_for_selection(&mut b, b.open_until - 1.0));
        assert!(refresh_for_selection(&mut b, b.open_until));
        assert_eq!(b.state, BreakerState::HalfOpen);
    }

    #[test]
    fn successful_probe_closes_breaker() {
        let mut b = BreakerCounters {
            state: BreakerState::HalfOpen,
            ..fresh()
        };
        record_success(&mut b);
        assert_eq!(b.state, BreakerState::Closed);
        assert_eq!(b.consecutive_failures, 0);
    }

    #[test]
    fn failed_probe_reopens_and_doubles_cooldown() {
        let config = BreakerConfig::default();
        let mut b = BreakerCounters {
            state: BreakerState::HalfOpen,
            cooldown_secs: 30.0,
            ..fresh()
        };
        record_failure(&mut b, 100.0, &config);
        assert_eq!(b.state, BreakerState::Open);
        assert_eq!(b.cooldown_secs, 60.0);
    }

    #[test]
    fn doubled_cooldown_is_capped() {
        let config = BreakerConfig::default();
        let mut b = BreakerCounters {
            state: BreakerState::HalfOpen,
            cooldown_secs: 250.0,
            ..fresh()
        };
        record_failure(&mut b, 100.0, &config);
        assert_eq!(b.cooldown_secs, config.cooldown_cap_secs);
    }
}
