//! The low-level protocol client.
//!
//! [`BayeuxClient`] binds the connection state machine, the session token,
//! the extension pipeline, and the injected transport into the five
//! protocol operations: `handshake`, `connect`, `subscribe`, `unsubscribe`,
//! and `disconnect`. Each operation frames a request batch through the
//! builders, runs the extension pipeline on both directions, and validates
//! the response, surfacing failures as the matching structured error.
//!
//! This type performs exactly one request per call and holds no queues; the
//! polling engine in [`crate::client::engine`] drives it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::state::{ConnectionState, ConnectionStateMachine, Event, SessionState};
use crate::error::{
    AlreadyRegisteredError, BadResponseError, BayeuxError, ConnectionFailedError,
    DisconnectFailedError, HandshakeFailedError, Result, SubscriptionFailedError,
    UnsubscribeFailedError,
};
use crate::extension::MessageExtension;
use crate::protocol::channel::{
    META_CONNECT, META_DISCONNECT, META_HANDSHAKE, META_SUBSCRIBE, META_UNSUBSCRIBE,
};
use crate::protocol::{
    Advice, Channel, ConnectRequestBuilder, DisconnectRequestBuilder, HandshakeRequestBuilder,
    Message, SubscribeRequestBuilder, UnsubscribeRequestBuilder, BAYEUX_VERSION,
    CONNECTION_TYPE_LONG_POLLING,
};
use crate::transport::{HttpTransport, TransportError};

/// A client for one Bayeux session over an injected HTTP transport.
///
/// All operations take a [`CancellationToken`]; cancelling it resolves any
/// in-flight transport call, which surfaces as
/// [`TransportError::Cancelled`] wrapped in the operation's error.
pub struct BayeuxClient {
    state_machine: ConnectionStateMachine,
    session: SessionState,
    transport: Arc<dyn HttpTransport>,
    extensions: RwLock<Vec<Arc<dyn MessageExtension>>>,
    request_timeout: Option<Duration>,
    // Deadline for the next /meta/connect, taken from server advice.
    connect_timeout: Mutex<Option<Duration>>,
}

impl BayeuxClient {
    /// A client speaking through `transport`.
    ///
    /// `request_timeout` bounds every operation except `/meta/connect`,
    /// whose deadline follows server advice.
    pub fn new(transport: Arc<dyn HttpTransport>, request_timeout: Option<Duration>) -> Self {
        BayeuxClient {
            state_machine: ConnectionStateMachine::new(),
            session: SessionState::new(),
            transport,
            extensions: RwLock::new(Vec::new()),
            request_timeout,
            connect_timeout: Mutex::new(None),
        }
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.state_machine.is_connected()
    }

    /// The current connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.state_machine.current_state()
    }

    /// The session token assigned at handshake; empty before one succeeds.
    pub fn client_id(&self) -> String {
        self.session.client_id()
    }

    /// Send the handshake request to the Bayeux server.
    ///
    /// Requires the `UNCONNECTED` state. On success the session token is
    /// recorded and the state machine lands in `CONNECTED`.
    pub async fn handshake(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        debug!(at = "handshake", "starting");
        let start = Instant::now();
        self.state_machine
            .handle_event(Event::HandshakeSent)
            .map_err(HandshakeFailedError::new)?;

        let mut builder = HandshakeRequestBuilder::new();
        builder
            .add_version(BAYEUX_VERSION)
            .map_err(HandshakeFailedError::new)?;
        builder
            .add_supported_connection_type(CONNECTION_TYPE_LONG_POLLING)
            .map_err(HandshakeFailedError::new)?;
        let batch = builder.build().map_err(HandshakeFailedError::new)?;

        let response = self
            .round_trip(batch, self.request_timeout, cancel)
            .await
            .map_err(HandshakeFailedError::new)?;
        if response.len() > 1 {
            return Err(HandshakeFailedError::new(BayeuxError::TooManyMessages).into());
        }
        let message = response
            .iter()
            .find(|m| m.channel == META_HANDSHAKE)
            .ok_or_else(|| HandshakeFailedError::new(BayeuxError::BadChannel))?;
        if !message.is_successful() {
            let detail = message.error.clone().unwrap_or_default();
            return Err(HandshakeFailedError::new(BayeuxError::Server(detail)).into());
        }

        self.session
            .set_client_id(message.client_id.clone().unwrap_or_default());
        if let Some(advice) = &message.advice {
            self.remember_connect_timeout(advice);
        }
        let _ = self.state_machine.handle_event(Event::SuccessfullyConnected);
        debug!(at = "handshake", elapsed = ?start.elapsed(), "finishing");
        Ok(response)
    }

    /// Abandon the current session and negotiate a new one.
    ///
    /// Used when server advice demands a fresh handshake mid-stream: the
    /// state machine drops back to `UNCONNECTED` first so the handshake
    /// precondition holds.
    pub async fn rehandshake(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        self.state_machine.handle_event(Event::Timeout)?;
        self.handshake(cancel).await
    }

    /// Send a `/meta/connect` poll.
    ///
    /// Clients must maintain only one outstanding connect request; the
    /// polling engine enforces that through its one-slot request queue. See
    /// <https://docs.cometd.org/current/reference/#_bayeux_meta_connect>.
    ///
    /// Returns every message in the response for the caller to fan out.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        debug!(at = "connect", "starting");
        let start = Instant::now();
        let client_id = self.session.client_id();
        if !self.state_machine.is_connected() || client_id.is_empty() {
            return Err(BayeuxError::ClientNotConnected);
        }

        let mut builder = ConnectRequestBuilder::new();
        builder.add_client_id(client_id);
        builder
            .add_connection_type(CONNECTION_TYPE_LONG_POLLING)
            .map_err(ConnectionFailedError::new)?;
        let batch = builder.build().map_err(ConnectionFailedError::new)?;

        let timeout = *self.connect_timeout.lock();
        let response = self
            .round_trip(batch, timeout, cancel)
            .await
            .map_err(ConnectionFailedError::new)?;

        for message in &response {
            if message.channel == META_CONNECT {
                if let Some(advice) = &message.advice {
                    self.remember_connect_timeout(advice);
                }
                if !message.is_successful() {
                    return Err(
                        ConnectionFailedError::new(BayeuxError::FailedToConnect).into()
                    );
                }
            }
        }
        debug!(at = "connect", elapsed = ?start.elapsed(), "finishing");
        Ok(response)
    }

    /// Subscribe to `channels` in a single request batch.
    ///
    /// One envelope per channel goes out; any unsuccessful
    /// `/meta/subscribe` response fails the whole call with the attempted
    /// channels attached.
    pub async fn subscribe(
        &self,
        channels: &[Channel],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        debug!(at = "subscribe", count = channels.len(), "starting");
        let start = Instant::now();
        let attempted = || channels.to_vec();
        let client_id = self.session.client_id();
        if !self.state_machine.is_connected() || client_id.is_empty() {
            return Err(
                SubscriptionFailedError::new(attempted(), BayeuxError::ClientNotConnected).into(),
            );
        }

        let mut builder = SubscribeRequestBuilder::new();
        builder.add_client_id(client_id);
        for channel in channels {
            builder
                .add_subscription(channel.clone())
                .map_err(|e| SubscriptionFailedError::new(attempted(), e))?;
        }
        let batch = builder
            .build()
            .map_err(|e| SubscriptionFailedError::new(attempted(), e))?;

        let response = self
            .round_trip(batch, self.request_timeout, cancel)
            .await
            .map_err(|e| SubscriptionFailedError::new(attempted(), e))?;

        for message in &response {
            if message.channel == META_SUBSCRIBE && !message.is_successful() {
                let detail = message.error.clone().unwrap_or_default();
                return Err(
                    SubscriptionFailedError::new(attempted(), BayeuxError::Server(detail)).into(),
                );
            }
        }
        debug!(at = "subscribe", elapsed = ?start.elapsed(), "finishing");
        Ok(response)
    }

    /// Unsubscribe from `channels` in a single request batch.
    pub async fn unsubscribe(
        &self,
        channels: &[Channel],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        debug!(at = "unsubscribe", count = channels.len(), "starting");
        let attempted = || channels.to_vec();
        let client_id = self.session.client_id();
        if !self.state_machine.is_connected() || client_id.is_empty() {
            return Err(
                UnsubscribeFailedError::new(attempted(), BayeuxError::ClientNotConnected).into(),
            );
        }

        let mut builder = UnsubscribeRequestBuilder::new();
        builder.add_client_id(client_id);
        for channel in channels {
            builder
                .add_subscription(channel.clone())
                .map_err(|e| UnsubscribeFailedError::new(attempted(), e))?;
        }
        let batch = builder
            .build()
            .map_err(|e| UnsubscribeFailedError::new(attempted(), e))?;

        let response = self
            .round_trip(batch, self.request_timeout, cancel)
            .await
            .map_err(|e| UnsubscribeFailedError::new(attempted(), e))?;

        for message in &response {
            if message.channel == META_UNSUBSCRIBE && !message.is_successful() {
                let detail = message.error.clone().unwrap_or_default();
                return Err(
                    UnsubscribeFailedError::new(attempted(), BayeuxError::Server(detail)).into(),
                );
            }
        }
        Ok(response)
    }

    /// Send a `/meta/disconnect` request to terminate the session.
    ///
    /// On success the state machine drops back to `UNCONNECTED`.
    pub async fn disconnect(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        debug!(at = "disconnect", "starting");
        let client_id = self.session.client_id();
        if !self.state_machine.is_connected() || client_id.is_empty() {
            return Err(DisconnectFailedError::new(BayeuxError::ClientNotConnected).into());
        }

        let mut builder = DisconnectRequestBuilder::new();
        builder.add_client_id(client_id);
        let batch = builder.build().map_err(DisconnectFailedError::new)?;

        let response = self
            .round_trip(batch, self.request_timeout, cancel)
            .await
            .map_err(DisconnectFailedError::new)?;

        for message in &response {
            if message.channel == META_DISCONNECT && !message.is_successful() {
                return Err(DisconnectFailedError::refused().into());
            }
        }
        let _ = self.state_machine.handle_event(Event::DisconnectSent);
        Ok(response)
    }

    /// Append `extension` to the pipeline.
    ///
    /// # Errors
    ///
    /// [`AlreadyRegisteredError`] if an extension with the same name is
    /// already registered.
    pub fn use_extension(&self, extension: Arc<dyn MessageExtension>) -> Result<()> {
        let mut extensions = self.extensions.write();
        if extensions.iter().any(|e| e.name() == extension.name()) {
            return Err(AlreadyRegisteredError {
                extension: extension.name().to_string(),
            }
            .into());
        }
        extension.registered(extension.name());
        extensions.push(extension);
        Ok(())
    }

    /// Remove the extension named `name` from the pipeline, if present.
    pub fn remove_extension(&self, name: &str) {
        let mut extensions = self.extensions.write();
        if let Some(index) = extensions.iter().position(|e| e.name() == name) {
            let extension = extensions.remove(index);
            extension.unregistered();
        }
    }

    fn remember_connect_timeout(&self, advice: &Advice) {
        if advice.timeout.is_some() {
            *self.connect_timeout.lock() = Some(advice.timeout_as_duration());
        }
    }

    /// One request/response cycle: extension pipeline, JSON framing,
    /// transport dispatch, status check, JSON parsing, pipeline again.
    async fn round_trip(
        &self,
        mut batch: Vec<Message>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        {
            // Outgoing hooks run before framing so ext mutations reach the wire.
            let extensions = self.extensions.read();
            for extension in extensions.iter() {
                for message in batch.iter_mut() {
                    extension.outgoing(message);
                }
            }
        }
        let payload = serde_json::to_vec(&batch)?;

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            result = self.transport.post(payload, timeout) => result?,
        };

        if response.status != http::StatusCode::OK {
            return Err(BadResponseError::new(response.status, response.body).into());
        }
        let mut messages: Vec<Message> = serde_json::from_slice(&response.body)?;
        {
            let extensions = self.extensions.read();
            for extension in extensions.iter() {
                for message in messages.iter_mut() {
                    extension.incoming(message);
                }
            }
        }
        Ok(messages)
    }
}

impl std::fmt::Debug for BayeuxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayeuxClient")
            .field("state", &self.current_state())
            .field("extensions", &self.extensions.read().len())
            .finish()
    }
}
