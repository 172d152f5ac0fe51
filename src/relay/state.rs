//! Process-wide relay state read by the status reporter.
//!
//! Everything here is atomics: the upstream link writes, HTTP handlers and
//! the broadcaster read.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::observability::metrics;

/// Lifecycle state of the upstream link.
///
/// ```text
/// Disconnected → Connecting → Connected → Disconnected (close)
///     → [ReconnectScheduled → Connecting]* → Exhausted
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    ReconnectScheduled = 3,
    Exhausted = 4,
    Stopped = 5,
}

impl From<u8> for LinkState {
    fn from(val: u8) -> Self {
        match val {
            1 => LinkState::Connecting,
            2 => LinkState::Connected,
            3 => LinkState::ReconnectScheduled,
            4 => LinkState::Exhausted,
            5 => LinkState::Stopped,
            _ => LinkState::Disconnected,
        }
    }
}

/// Shared counters and link status.
#[derive(Debug)]
pub struct RelayState {
    started_at: Instant,
    message_count: AtomicU64,
    link_state: AtomicU8,
    reconnect_attempts: AtomicU32,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            message_count: AtomicU64::new(0),
            link_state: AtomicU8::new(LinkState::Disconnected as u8),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Count one upstream message, returning the new total.
    pub fn record_message(&self) -> u64 {
        self.message_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn link_state(&self) -> LinkState {
        LinkState::from(self.link_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_link_state(&self, state: LinkState) {
        let previous = LinkState::from(self.link_state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Upstream link state changed");
            metrics::record_upstream_connected(state == LinkState::Connected);
        }
    }

    pub fn upstream_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    /// Point-in-time view for health reporting.
    pub fn snapshot(&self, clients: usize) -> StatusSnapshot {
        let link_state = self.link_state();
        StatusSnapshot {
            status: if link_state == LinkState::Exhausted { "exhausted" } else { "ok" },
            clients,
            ais_connected: link_state == LinkState::Connected,
            uptime: self.uptime().as_secs(),
            message_count: self.message_count(),
            upstream_state: link_state,
            reconnect_attempts: self.reconnect_attempts(),
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized body of `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub clients: usize,
    pub ais_connected: bool,
    /// Seconds since process start.
    pub uptime: u64,
    pub message_count: u64,
    pub upstream_state: LinkState,
    pub reconnect_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_counter_is_monotonic() {
        let state = RelayState::new();
        assert_eq!(state.record_message(), 1);
        assert_eq!(state.record_message(), 2);
        assert_eq!(state.message_count(), 2);
    }

    #[test]
    fn test_snapshot_reports_exhaustion() {
        let state = RelayState::new();
        state.set_link_state(LinkState::Exhausted);
        state.set_reconnect_attempts(10);

        let snapshot = state.snapshot(4);
        assert_eq!(snapshot.status, "exhausted");
        assert!(!snapshot.ais_connected);
        assert_eq!(snapshot.clients, 4);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["upstreamState"], "exhausted");
        assert_eq!(value["reconnectAttempts"], 10);
        assert_eq!(value["aisConnected"], false);
    }

    #[test]
    fn test_link_state_round_trips_through_u8() {
        for state in [
            LinkState::Disconnected,
            LinkState::Connecting,
            LinkState::Connected,
            LinkState::ReconnectScheduled,
            LinkState::Exhausted,
            LinkState::Stopped,
        ] {
            assert_eq!(LinkState::from(state as u8), state);
        }
    }
}
