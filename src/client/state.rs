//! Connection state machine and session state.
//!
//! The connection lifecycle is a three-state machine:
//!
//! ```text
//! UNCONNECTED ──handshake sent──► CONNECTING ──successful connect──► CONNECTED
//!      ▲                              │                                  │
//!      └───────────── timeout / disconnect sent ───────────────────────┘
//! ```
//!
//! The state lives in a single atomic byte. Transitions that require a
//! particular starting state use compare-and-swap, so they are wait-free and
//! an invalid transition leaves the state untouched. `timeout` and
//! `disconnect sent` are sinks: they always land in `UNCONNECTED`.
//!
//! See <https://docs.cometd.org/current/reference/#_client_state_table>.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use crate::error::{
    BadConnectionError, BadHandshakeError, BadStateError, Result, UnknownEventTypeError,
};

const UNCONNECTED: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;

/// The observable state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session with the server.
    Unconnected,
    /// Handshake sent, waiting for the server to accept.
    Connecting,
    /// Session established; polling may proceed.
    Connected,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            CONNECTING => ConnectionState::Connecting,
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Unconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Unconnected => "UNCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        })
    }
}

/// An event that can change the state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A handshake request went out.
    HandshakeSent,
    /// The session timed out or was abandoned.
    Timeout,
    /// The server acknowledged the handshake.
    SuccessfullyConnected,
    /// A disconnect request went out.
    DisconnectSent,
}

impl FromStr for Event {
    type Err = UnknownEventTypeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "handshake request sent" => Ok(Event::HandshakeSent),
            "timeout" => Ok(Event::Timeout),
            "successful connect response" => Ok(Event::SuccessfullyConnected),
            "disconnect request sent" => Ok(Event::DisconnectSent),
            _ => Err(UnknownEventTypeError {
                event: name.to_string(),
            }),
        }
    }
}

/// Manages the connection's state through atomic transitions.
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: AtomicU8,
}

impl ConnectionStateMachine {
    /// A machine in the initial `UNCONNECTED` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the connection is currently `CONNECTED`.
    pub fn is_connected(&self) -> bool {
        self.current_state.load(Ordering::SeqCst) == CONNECTED
    }

    /// The current state of the machine.
    pub fn current_state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.current_state.load(Ordering::SeqCst))
    }

    /// Apply an event to the machine.
    ///
    /// # Errors
    ///
    /// [`BadHandshakeError`] when a handshake is attempted outside
    /// `UNCONNECTED`, [`BadConnectionError`] when a successful connect
    /// response arrives outside `CONNECTING`. In both cases the state is
    /// unchanged.
    pub fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::HandshakeSent => {
                if let Err(observed) = self.current_state.compare_exchange(
                    UNCONNECTED,
                    CONNECTING,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    return Err(BadHandshakeError(BadStateError {
                        current: ConnectionState::from_raw(observed),
                        from: ConnectionState::Unconnected,
                        to: ConnectionState::Connecting,
                        message: "attempting to handshake but not in unconnected state",
                    })
                    .into());
                }
            }
            Event::SuccessfullyConnected => {
                if let Err(observed) = self.current_state.compare_exchange(
                    CONNECTING,
                    CONNECTED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    return Err(BadConnectionError(BadStateError {
                        current: ConnectionState::from_raw(observed),
                        from: ConnectionState::Connecting,
                        to: ConnectionState::Connected,
                        message: "invalid state for successful connect response event",
                    })
                    .into());
                }
            }
            Event::Timeout => {
                self.current_state.store(UNCONNECTED, Ordering::SeqCst);
            }
            Event::DisconnectSent => {
                // Only a live session drops back; already-unconnected is a no-op.
                let _ = self.current_state.compare_exchange(
                    CONNECTED,
                    UNCONNECTED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                let _ = self.current_state.compare_exchange(
                    CONNECTING,
                    UNCONNECTED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
        }
        Ok(())
    }
}

/// The session identity handed out at handshake.
///
/// Reads and writes come from the polling task and caller tasks
/// concurrently, so the token sits behind a read-biased lock.
#[derive(Debug, Default)]
pub struct SessionState {
    client_id: RwLock<String>,
}

impl SessionState {
    /// A session with no assigned token.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current session token; empty until a handshake succeeds.
    pub fn client_id(&self) -> String {
        self.client_id.read().clone()
    }

    /// Record the token the server assigned.
    pub fn set_client_id(&self, client_id: String) {
        *self.client_id.write() = client_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BayeuxError;

    #[test]
    fn starts_unconnected() {
        let machine = ConnectionStateMachine::new();
        assert!(!machine.is_connected());
        assert_eq!(machine.current_state(), ConnectionState::Unconnected);
        assert_eq!(machine.current_state().to_string(), "UNCONNECTED");
    }

    #[test]
    fn happy_path_reaches_connected() {
        let machine = ConnectionStateMachine::new();
        machine.handle_event(Event::HandshakeSent).unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Connecting);
        machine.handle_event(Event::SuccessfullyConnected).unwrap();
        assert!(machine.is_connected());
        assert_eq!(machine.current_state().to_string(), "CONNECTED");
    }

    #[test]
    fn handshake_outside_unconnected_fails_without_moving() {
        let machine = ConnectionStateMachine::new();
        machine.handle_event(Event::HandshakeSent).unwrap();
        let err = machine.handle_event(Event::HandshakeSent).unwrap_err();
        assert!(matches!(err, BayeuxError::BadHandshake(_)));
        assert_eq!(machine.current_state(), ConnectionState::Connecting);
    }

    #[test]
    fn connect_outside_connecting_fails_without_moving() {
        let machine = ConnectionStateMachine::new();
        let err = machine
            .handle_event(Event::SuccessfullyConnected)
            .unwrap_err();
        match err {
            BayeuxError::BadConnection(BadConnectionError(state)) => {
                assert_eq!(state.current, ConnectionState::Unconnected);
                assert_eq!(state.from, ConnectionState::Connecting);
                assert_eq!(state.to, ConnectionState::Connected);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(machine.current_state(), ConnectionState::Unconnected);
    }

    #[test]
    fn timeout_always_lands_unconnected() {
        let machine = ConnectionStateMachine::new();
        for _ in 0..2 {
            machine.handle_event(Event::Timeout).unwrap();
            assert_eq!(machine.current_state(), ConnectionState::Unconnected);
        }
        machine.handle_event(Event::HandshakeSent).unwrap();
        machine.handle_event(Event::Timeout).unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Unconnected);
    }

    #[test]
    fn disconnect_drops_live_sessions_and_ignores_dead_ones() {
        let machine = ConnectionStateMachine::new();
        machine.handle_event(Event::DisconnectSent).unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Unconnected);

        machine.handle_event(Event::HandshakeSent).unwrap();
        machine.handle_event(Event::SuccessfullyConnected).unwrap();
        machine.handle_event(Event::DisconnectSent).unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Unconnected);
    }

    #[test]
    fn concurrent_handshakes_admit_exactly_one_winner() {
        let machine = std::sync::Arc::new(ConnectionStateMachine::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = machine.clone();
                std::thread::spawn(move || machine.handle_event(Event::HandshakeSent).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(machine.current_state(), ConnectionState::Connecting);
    }

    #[test]
    fn event_names_parse_and_unknown_names_fail() {
        assert_eq!(
            "handshake request sent".parse::<Event>().unwrap(),
            Event::HandshakeSent
        );
        assert_eq!("timeout".parse::<Event>().unwrap(), Event::Timeout);
        let err = "reticulate splines".parse::<Event>().unwrap_err();
        assert!(err.to_string().contains("unknown event type"));
    }

    #[test]
    fn session_state_round_trips_client_id() {
        let session = SessionState::new();
        assert!(session.client_id().is_empty());
        session.set_client_id("abc123".to_string());
        assert_eq!(session.client_id(), "abc123");
    }
}
