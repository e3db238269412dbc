//! Tunables for the delivery core.

use std::time::Duration;

/// Long-poll re-check interval.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Wait applied to a long-poll that does not ask for a specific timeout.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

/// Upper bound on any single long-poll wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Pending deliveries a push subscriber may have queued before it is dropped.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

const MIN_RECHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Longest wait or re-check interval the waiter will schedule. Larger values
/// (up to `Duration::MAX`) are treated as this, so deadlines never overflow.
pub const WAIT_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub recheck_interval: Duration,
    pub default_wait: Duration,
    pub max_wait: Duration,
    pub subscriber_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            default_wait: DEFAULT_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl CoreConfig {
    /// Normalize out-of-range values instead of failing startup.
    ///
    /// - `recheck_interval` is at least 1ms (a zero tokio interval panics).
    /// - `max_wait` and `recheck_interval` are at most [`WAIT_CEILING`].
    /// - `default_wait` never exceeds `max_wait`.
    /// - `subscriber_buffer` is at least 1 so the initial delivery always fits.
    pub fn normalized(mut self) -> Self {
        if self.recheck_interval < MIN_RECHECK_INTERVAL {
            self.recheck_interval = MIN_RECHECK_INTERVAL;
        }
        self.recheck_interval = self.recheck_interval.min(WAIT_CEILING);
        self.max_wait = self.max_wait.min(WAIT_CEILING);
        if self.default_wait > self.max_wait {
            self.default_wait = self.max_wait;
        }
        self.subscriber_buffer = self.subscriber_buffer.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_normal() {
        let config = CoreConfig::default();
        assert_eq!(config.clone().normalized(), config);
        assert_eq!(config.recheck_interval, Duration::from_secs(1));
    }

    #[test]
    fn normalized_clamps_out_of_range_values() {
        let config = CoreConfig {
            recheck_interval: Duration::ZERO,
            default_wait: Duration::from_secs(90),
            max_wait: Duration::from_secs(10),
            subscriber_buffer: 0,
        }
        .normalized();

        assert_eq!(config.recheck_interval, Duration::from_millis(1));
        assert_eq!(config.default_wait, Duration::from_secs(10));
        assert_eq!(config.subscriber_buffer, 1);
    }

    #[test]
    fn unbounded_wait_is_capped_at_ceiling() {
        let config = CoreConfig {
            recheck_interval: Duration::MAX,
            default_wait: Duration::MAX,
            max_wait: Duration::MAX,
            ..CoreConfig::default()
        }
        .normalized();

        assert_eq!(config.max_wait, WAIT_CEILING);
        assert_eq!(config.default_wait, WAIT_CEILING);
        assert_eq!(config.recheck_interval, WAIT_CEILING);
    }
}
