//! Consecutive-failure accounting for the health loop.

/// What the supervisor should do after one health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Probe passed; the counter was reset.
    Healthy,
    /// Probe failed but the threshold has not been crossed.
    Degraded,
    /// More than `max_failures` consecutive failures.
    RestartRequired,
}

/// Failure counter owned by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    failures: u32,
    max_failures: u32,
}

impl HealthState {
    /// Counter tolerating `max_failures` consecutive failures.
    pub const fn new(max_failures: u32) -> Self {
        Self {
            failures: 0,
            max_failures,
        }
    }

    /// Current consecutive failures.
    pub const fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Record one probe result.
    pub const fn record(&mut self, healthy: bool) -> HealthVerdict {
        if healthy {
            self.failures = 0;
            return HealthVerdict::Healthy;
        }
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.max_failures {
            HealthVerdict::RestartRequired
        } else {
            HealthVerdict::Degraded
        }
    }

    /// Zero the counter, whatever the restart outcome was.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn third_failure_requires_restart_with_default_threshold() {
        let mut state = HealthState::new(2);
        assert_eq!(state.record(false), HealthVerdict::Degraded);
        assert_eq!(state.record(false), HealthVerdict::Degraded);
        assert_eq!(state.record(false), HealthVerdict::RestartRequired);
        state.reset();
        assert_eq!(state.failure_count(), 0);
    }

    #[test]
    fn success_clears_the_streak() {
        let mut state = HealthState::new(2);
        state.record(false);
        state.record(false);
        assert_eq!(state.record(true), HealthVerdict::Healthy);
        assert_eq!(state.record(false), HealthVerdict::Degraded);
    }

    proptest! {
        #[test]
        fn restart_fires_exactly_at_threshold_plus_one(max in 0u32..10) {
            let mut state = HealthState::new(max);
            for _ in 0..max {
                prop_assert_eq!(state.record(false), HealthVerdict::Degraded);
            }
            prop_assert_eq!(state.record(false), HealthVerdict::RestartRequired);
        }
    }
}
