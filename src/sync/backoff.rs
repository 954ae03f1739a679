//! Reconnect schedule.
//!
//! A fixed list of delays, consumed one per failed attempt. Attempts past the
//! end of the list reuse the last delay, so the default schedule runs
//! `0, 2s, 10s, 30s, 30s, ...`. An optional attempt limit turns the schedule
//! finite; once exhausted the state machine gives up and goes
//! `Disconnected`.

use std::time::Duration;

use crate::constants::DEFAULT_RECONNECT_DELAYS_MS;

/// Delay schedule for automatic reconnection after an unexpected drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
    max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RECONNECT_DELAYS_MS, None)
    }
}

impl ReconnectPolicy {
    /// Build a policy from delays in milliseconds.
    ///
    /// An empty list means "retry immediately, forever".
    pub fn from_millis(delays_ms: &[u64], max_attempts: Option<u32>) -> Self {
        let mut delays: Vec<Duration> = delays_ms.iter().copied().map(Duration::from_millis).collect();
        if delays.is_empty() {
            delays.push(Duration::ZERO);
        }
        Self {
            delays,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based), or `None`
    /// when the attempt limit has been reached.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }
        let index = (attempt as usize).min(self.delays.len() - 1);
        self.delays.get(index).copied()
    }

    /// The configured delays.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// The attempt limit, if any.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}
