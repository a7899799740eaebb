//! Error types and result handling.
//!
//! Errors fall into two families, mirroring how callers need to react:
//!
//! - **Sentinel kinds** are unit variants of [`BayeuxError`] and compare
//!   directly (`matches!(err, BayeuxError::ClientNotConnected)`).
//! - **Structured kinds** are dedicated types that wrap a cause and carry
//!   context (the attempted channels, the HTTP status, the state-machine
//!   transition). Each one converts into [`BayeuxError`] and is reachable
//!   back out through `std::error::Error::source`.
//!
//! Protocol operations never log-and-swallow: a failed handshake comes back
//! as [`HandshakeFailedError`] wrapping whatever went wrong underneath, a
//! failed poll as [`ConnectionFailedError`], and so on. The polling engine
//! forwards them to its error stream; an ignore-error predicate on the
//! client configuration decides whether the loop survives them.

use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;

use crate::client::state::ConnectionState;
use crate::protocol::Channel;
use crate::transport::TransportError;

/// A specialized `Result` type for Bayeux client operations.
pub type Result<T, E = BayeuxError> = std::result::Result<T, E>;

/// The unified error type for this crate.
///
/// Sentinel conditions are inline variants; richer failures wrap one of the
/// structured error types below.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BayeuxError {
    /// The client is not connected to the server.
    #[error("client not connected to server")]
    ClientNotConnected,

    /// More than one message came back in a handshake response.
    #[error("more messages than expected in handshake response")]
    TooManyMessages,

    /// A handshake response arrived on a channel other than `/meta/handshake`.
    #[error("handshake responses must come back via the /meta/handshake channel")]
    BadChannel,

    /// The server reported an unsuccessful `/meta/connect`.
    #[error("connect request was not successful")]
    FailedToConnect,

    /// A handshake request was built without any connection types.
    #[error("no supported connection types provided")]
    NoSupportedConnectionTypes,

    /// A handshake request was built without a protocol version.
    #[error("no version specified")]
    NoVersion,

    /// A request that needs a `clientId` was built without one.
    #[error("missing clientId value")]
    MissingClientId,

    /// A connect request was built without a connection type.
    #[error("missing connectionType value")]
    MissingConnectionType,

    /// `publish` is reserved and not implemented.
    #[error("publish is reserved and not implemented")]
    PublishUnsupported,

    /// The channel already has a subscriber registered.
    #[error("channel '{0}' already subscribed")]
    AlreadySubscribed(Channel),

    /// No subscriber is registered for the channel.
    #[error("channel '{0}' has no subscriptions")]
    NoSubscription(Channel),

    /// The server reported a failure in a response message's `error` field.
    #[error("server reported an error: {0}")]
    Server(String),

    /// The server address could not be parsed as a URL.
    #[error("invalid server address: {0}")]
    InvalidServerAddress(#[from] url::ParseError),

    /// A message batch could not be encoded or decoded as JSON.
    #[error("message batch not parseable: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A `/meta/connect` request failed.
    #[error(transparent)]
    ConnectionFailed(#[from] ConnectionFailedError),

    /// A `/meta/handshake` request failed.
    #[error(transparent)]
    HandshakeFailed(#[from] HandshakeFailedError),

    /// A `/meta/subscribe` request failed.
    #[error(transparent)]
    SubscriptionFailed(#[from] SubscriptionFailedError),

    /// A `/meta/unsubscribe` request failed.
    #[error(transparent)]
    UnsubscribeFailed(#[from] UnsubscribeFailedError),

    /// A `/meta/disconnect` request failed.
    #[error(transparent)]
    DisconnectFailed(#[from] DisconnectFailedError),

    /// An extension with the same name is already registered.
    #[error(transparent)]
    AlreadyRegistered(#[from] AlreadyRegisteredError),

    /// The server returned a non-200 HTTP response.
    #[error(transparent)]
    BadResponse(#[from] BadResponseError),

    /// A connection type outside the closed set was supplied.
    #[error(transparent)]
    BadConnectionType(#[from] BadConnectionTypeError),

    /// A protocol version string failed validation.
    #[error(transparent)]
    BadConnectionVersion(#[from] BadConnectionVersionError),

    /// A channel name failed validation.
    #[error(transparent)]
    InvalidChannel(#[from] InvalidChannelError),

    /// A non-empty list was required but none was provided.
    #[error(transparent)]
    EmptySlice(#[from] EmptySliceError),

    /// A message `error` field did not follow the `code:args:message` format.
    #[error(transparent)]
    MessageUnparsable(#[from] MessageUnparsableError),

    /// A message `timestamp` field did not follow the expected profile.
    #[error(transparent)]
    TimestampUnparsable(#[from] TimestampUnparsableError),

    /// A state-machine transition was attempted from an invalid state.
    #[error(transparent)]
    BadState(#[from] BadStateError),

    /// A handshake was attempted while not unconnected.
    #[error(transparent)]
    BadHandshake(#[from] BadHandshakeError),

    /// A connect acknowledgment arrived while not connecting.
    #[error(transparent)]
    BadConnection(#[from] BadConnectionError),

    /// An event name did not map to any state-machine event.
    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventTypeError),
}

/// Returned whenever `connect` is called and it fails.
#[derive(Debug, Error)]
#[error("connection failed ({source})")]
pub struct ConnectionFailedError {
    /// The underlying cause.
    #[source]
    pub source: Box<BayeuxError>,
}

impl ConnectionFailedError {
    /// Wrap a cause in a connect failure.
    pub fn new(cause: impl Into<BayeuxError>) -> Self {
        Self {
            source: Box::new(cause.into()),
        }
    }
}

/// Returned whenever the handshake fails.
#[derive(Debug, Error)]
#[error("handshake failed ({source})")]
pub struct HandshakeFailedError {
    /// The underlying cause.
    #[source]
    pub source: Box<BayeuxError>,
}

impl HandshakeFailedError {
    /// Wrap a cause in a handshake failure.
    pub fn new(cause: impl Into<BayeuxError>) -> Self {
        Self {
            source: Box::new(cause.into()),
        }
    }
}

/// Returned for any errors on `subscribe`.
#[derive(Debug, Error)]
#[error("subscription failed ({source})")]
pub struct SubscriptionFailedError {
    /// The channels the subscribe request was attempting to add.
    pub channels: Vec<Channel>,
    /// The underlying cause.
    #[source]
    pub source: Box<BayeuxError>,
}

impl SubscriptionFailedError {
    /// Wrap a cause alongside the attempted channels.
    pub fn new(channels: Vec<Channel>, cause: impl Into<BayeuxError>) -> Self {
        Self {
            channels,
            source: Box::new(cause.into()),
        }
    }
}

/// Returned for any errors on `unsubscribe`.
#[derive(Debug, Error)]
#[error("unsubscribe failed ({source})")]
pub struct UnsubscribeFailedError {
    /// The channels the unsubscribe request was attempting to remove.
    pub channels: Vec<Channel>,
    /// The underlying cause.
    #[source]
    pub source: Box<BayeuxError>,
}

impl UnsubscribeFailedError {
    /// Wrap a cause alongside the attempted channels.
    pub fn new(channels: Vec<Channel>, cause: impl Into<BayeuxError>) -> Self {
        Self {
            channels,
            source: Box::new(cause.into()),
        }
    }
}

/// Returned when the call to `disconnect` fails.
#[derive(Debug, Error)]
#[error(
    "unable to disconnect from server{}",
    .source.as_ref().map(|cause| format!(" ({cause})")).unwrap_or_default()
)]
pub struct DisconnectFailedError {
    /// The underlying cause, when one exists. A server that answers the
    /// disconnect with `successful: false` gives no further detail.
    #[source]
    pub source: Option<Box<BayeuxError>>,
}

impl DisconnectFailedError {
    /// Wrap a cause in a disconnect failure.
    pub fn new(cause: impl Into<BayeuxError>) -> Self {
        Self {
            source: Some(Box::new(cause.into())),
        }
    }

    /// A disconnect refused by the server without further detail.
    pub fn refused() -> Self {
        Self { source: None }
    }
}

/// Signifies that an extension with the same name is already registered
/// with the client.
#[derive(Debug, Error)]
#[error("extension already registered: {extension}")]
pub struct AlreadyRegisteredError {
    /// The name of the offending extension.
    pub extension: String,
}

/// Returned when we get an unexpected HTTP response from the server.
#[derive(Debug, Error)]
#[error(
    "expected 200 response from bayeux server, got {status} with status '{status_text}' and body '{}'",
    String::from_utf8_lossy(.body)
)]
pub struct BadResponseError {
    /// The HTTP status code the server returned.
    pub status: StatusCode,
    /// The canonical reason phrase for the status.
    pub status_text: String,
    /// The raw response body.
    pub body: Bytes,
}

impl BadResponseError {
    /// Build the error from a status and the raw body.
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        }
    }
}

/// Returned when we don't know how to handle the requested connection type.
#[derive(Debug, Error)]
#[error("{connection_type:?} is not a valid connection type")]
pub struct BadConnectionTypeError {
    /// The rejected connection type.
    pub connection_type: String,
}

/// Returned when we can't support the requested version number.
#[derive(Debug, Error)]
#[error("version {version:?} is invalid for Bayeux protocol")]
pub struct BadConnectionVersionError {
    /// The rejected version string.
    pub version: String,
}

/// The result of a failure to validate a channel name.
#[derive(Debug, Error)]
#[error("channel '{channel}' appears to not be a valid channel")]
pub struct InvalidChannelError {
    /// The rejected channel.
    pub channel: Channel,
}

/// Returned when an empty list is unexpected.
#[derive(Debug, Error)]
#[error("no {kind} provided")]
pub struct EmptySliceError {
    /// What the list was supposed to contain.
    pub kind: &'static str,
}

/// Returned when we fail to parse a message `error` field.
#[derive(Debug, Error)]
#[error("error message not parseable: {raw}")]
pub struct MessageUnparsableError {
    /// The raw error string.
    pub raw: String,
}

/// Returned when we fail to parse a message `timestamp` field.
#[derive(Debug, Error)]
#[error("timestamp not parseable: {raw}")]
pub struct TimestampUnparsableError {
    /// The raw timestamp string.
    pub raw: String,
}

/// Returned when a state-machine transition is not valid.
#[derive(Debug, Error)]
#[error("{message}, (current: {current}, from: {from}, to: {to})")]
pub struct BadStateError {
    /// The state the machine was actually in.
    pub current: ConnectionState,
    /// The state the transition required.
    pub from: ConnectionState,
    /// The state the transition was headed to.
    pub to: ConnectionState,
    /// What was being attempted.
    pub message: &'static str,
}

/// Returned when trying to handshake while not unconnected.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BadHandshakeError(pub BadStateError);

/// Returned when a successful-connect event arrives while not connecting.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BadConnectionError(pub BadStateError);

/// Returned when an event name is not recognized by the state machine.
#[derive(Debug, Error)]
#[error("unknown event type ({event:?})")]
pub struct UnknownEventTypeError {
    /// The unrecognized event name.
    pub event: String,
}
