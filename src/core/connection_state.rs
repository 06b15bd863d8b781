use crate::constants::{MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_MS, RECONNECT_MAX_DELAY_MS};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        })
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(RECONNECT_BASE_MS.saturating_mul(factor).min(RECONNECT_MAX_DELAY_MS))
}

#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub generation: u64,
    pub reconnect_attempts: u32,
    pub paused: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            generation: 0,
            reconnect_attempts: 0,
            paused: false,
        }
    }
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && !self.is_disconnected()
    }

    pub fn begin_connect(&mut self) -> u64 {
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        self.generation
    }

    pub fn mark_open(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.reconnect_attempts = 0;
    }

    pub fn mark_closed(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    /// Forget the current socket. Returns its generation when one was tracked.
    pub fn abandon(&mut self) -> Option<u64> {
        if self.is_disconnected() {
            return None;
        }
        let generation = self.generation;
        self.generation += 1;
        self.status = ConnectionStatus::Disconnected;
        Some(generation)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS
    }

    pub fn next_reconnect_delay(&mut self) -> Option<Duration> {
        if self.retries_exhausted() {
            return None;
        }
        self.reconnect_attempts += 1;
        Some(backoff_delay(self.reconnect_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_formula() {
        let expected = [1_000, 2_000, 4_000, 8_000, 16_000, 30_000];
        for (n, ms) in (1..=6).zip(expected) {
            assert_eq!(backoff_delay(n), Duration::from_millis(ms));
        }
        assert_eq!(backoff_delay(200), Duration::from_millis(RECONNECT_MAX_DELAY_MS));
    }

    #[test]
    fn test_retry_budget() {
        let mut state = ConnectionState::default();
        for n in 1..=MAX_RECONNECT_ATTEMPTS {
            assert_eq!(state.next_reconnect_delay(), Some(backoff_delay(n)));
        }
        assert!(state.retries_exhausted());
        assert_eq!(state.next_reconnect_delay(), None);
        state.mark_open();
        assert_eq!(state.reconnect_attempts, 0);
    }

    #[test]
    fn test_abandon_invalidates_generation() {
        let mut state = ConnectionState::default();
        assert_eq!(state.abandon(), None);
        let generation = state.begin_connect();
        assert!(state.is_current(generation));
        assert_eq!(state.abandon(), Some(generation));
        assert!(!state.is_current(generation));
        assert!(state.is_disconnected());
    }
}
