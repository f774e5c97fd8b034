use crate::config::PollConfig;
use std::time::Duration;

/// Poll health: Healthy runs at the base interval, Degraded backs off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollHealth {
    Healthy,
    Degraded,
}

/// Failure count and current interval of one poll loop
///
/// `current_interval` never drops below `base_interval`. Once
/// `consecutive_failures` reaches the degraded threshold the interval becomes
/// `base * 2^(failures - 2)`, capped at `max_interval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub consecutive_failures: u32,
    pub current_interval: Duration,
    pub base_interval: Duration,
    max_interval: Duration,
    degraded_after: u32,
}

impl PollState {
    pub fn new(config: &PollConfig) -> Self {
        let max_interval = config.max_interval.max(config.base_interval);
        Self {
            consecutive_failures: 0,
            current_interval: config.base_interval,
            base_interval: config.base_interval,
            max_interval,
            degraded_after: config.degraded_after,
        }
    }

    pub fn health(&self) -> PollHealth {
        if self.consecutive_failures >= self.degraded_after {
            PollHealth::Degraded
        } else {
            PollHealth::Healthy
        }
    }

    /// Reset to the base interval
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::info!(
                "Poll recovered after {} failures; interval back to {:?}",
                self.consecutive_failures,
                self.base_interval
            );
        }
        self.consecutive_failures = 0;
        self.current_interval = self.base_interval;
    }

    /// Count a failure and return the interval to wait before the next cycle
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.health() == PollHealth::Degraded {
            let next = self.degraded_interval();
            if next != self.current_interval {
                tracing::warn!(
                    "Poll failed {} times; increasing interval to {:?}",
                    self.consecutive_failures,
                    next
                );
                self.current_interval = next;
            }
        }
        self.current_interval
    }

    fn degraded_interval(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(2).min(31);
        self.base_interval
            .checked_mul(1u32 << exponent)
            .map_or(self.max_interval, |d| d.min(self.max_interval))
            .max(self.base_interval)
    }
}
