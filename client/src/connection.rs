//! Connection state machine with exponential backoff and manual retry

use log::{info, warn};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Automatic retries are exhausted; only a manual reconnect leaves this state
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt: base doubled per attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Tracks the connection and counts consecutive failed attempts. A TCP
/// connect alone does not reset the count; only a session that got as far as
/// joining the room does, so a server that accepts and immediately drops us
/// still runs out of retries.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    policy: ReconnectPolicy,
    failed_attempts: u32,
}

impl ConnectionTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            policy,
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The transport is up. The attempt count survives until [`established`].
    ///
    /// [`established`]: ConnectionTracker::established
    pub fn connected(&mut self) {
        if self.state != ConnectionState::Connected {
            info!("Connected");
        }
        self.state = ConnectionState::Connected;
    }

    /// The server accepted us into the room.
    pub fn established(&mut self) {
        if self.failed_attempts > 0 {
            info!("Session established after {} retries", self.failed_attempts);
        }
        self.failed_attempts = 0;
    }

    /// The transport went away, or a connection attempt failed. Returns how
    /// long to wait before the next attempt, or `None` once retries are
    /// exhausted.
    pub fn connection_lost(&mut self) -> Option<Duration> {
        if self.state == ConnectionState::Failed {
            return None;
        }

        let attempt = self.failed_attempts + 1;
        if attempt > self.policy.max_attempts {
            warn!(
                "Giving up after {} reconnect attempts",
                self.policy.max_attempts
            );
            self.state = ConnectionState::Failed;
            return None;
        }

        self.failed_attempts = attempt;
        let delay = self.policy.delay_for(attempt);
        info!("Reconnect attempt {} in {:?}", attempt, delay);
        self.state = ConnectionState::Reconnecting { attempt };
        Some(delay)
    }

    /// Leaves the failed state for a fresh round of attempts.
    pub fn manual_reconnect(&mut self) -> bool {
        if self.state != ConnectionState::Failed {
            return false;
        }
        info!("Manual reconnect requested");
        self.state = ConnectionState::Connecting;
        self.failed_attempts = 0;
        true
    }
}
