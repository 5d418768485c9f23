//! Socket transport abstraction, connection state, and reconnect policy.
//!
//! This module provides the shared types and the tokio-tungstenite
//! implementation of [`Transport`].

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::TransportError;

/// Connection state of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not initialized, disconnected on request, or no token to connect with.
    Idle,
    Connecting,
    Open,
    /// The socket closed; `clean` when the close handshake completed.
    Closed { clean: bool },
    /// Waiting out the delay before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Reconnect budget spent; only a new `init` starts over.
    Exhausted,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts after an abnormal close
    pub max_attempts: u32,
    /// Fixed delay before every attempt
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given (1-based) attempt, or `None` once the budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt <= self.max_attempts).then_some(self.delay)
    }
}

/// Something the socket reports back to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close {
        clean: bool,
        code: Option<u16>,
        reason: String,
    },
    Error(String),
}

impl TransportEvent {
    /// Close code browsers report for a connection lost without a close frame.
    pub const ABNORMAL_CLOSURE: u16 = 1006;

    pub fn abnormal_close(reason: impl Into<String>) -> Self {
        TransportEvent::Close {
            clean: false,
            code: Some(Self::ABNORMAL_CLOSURE),
            reason: reason.into(),
        }
    }
}

/// Emitter handed to a transport for one connection attempt.
///
/// Every event is stamped with the generation of the connection it belongs
/// to, so the manager can tell events of a superseded socket apart.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` once the manager has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Opens sockets. Implementations must return without waiting for the
/// handshake; the outcome is reported through `events`.
pub trait Transport: Send + Sync {
    fn open(
        &self,
        url: &Url,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// The write side of one socket.
pub trait TransportHandle: Send {
    /// Queue a text frame.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Start a clean close. Further sends fail.
    fn close(&self);
}

mod connection_native;
pub use connection_native::TungsteniteTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_is_fixed_within_budget() {
        let config = ReconnectConfig::default();
        for attempt in 1..=5 {
            assert_eq!(config.delay_for_attempt(attempt), Some(Duration::from_secs(3)));
        }
        assert_eq!(config.delay_for_attempt(6), None);
        assert_eq!(config.delay_for_attempt(0), None);
    }

    #[test]
    fn zero_budget_never_reconnects() {
        let config = ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(1), None);
    }

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Open.is_connected());
        assert!(!ConnectionState::Closed { clean: true }.is_connected());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_connecting());
        assert!(!ConnectionState::Exhausted.is_connecting());
    }

    #[test]
    fn events_carry_their_generation() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let events = TransportEvents::new(4, tx);
        assert!(events.emit(TransportEvent::Open));
        assert_eq!(rx.try_recv().unwrap(), (4, TransportEvent::Open));

        drop(rx);
        assert!(!events.emit(TransportEvent::Open));
    }
}
