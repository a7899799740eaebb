//! Validated construction of meta-channel request batches.
//!
//! Each builder accumulates the fields its request requires, validates them
//! on `build`, and returns the finished batch. Subscribe and unsubscribe
//! requests emit **one envelope per channel** rather than a single envelope
//! with an array: real-world servers treat the `subscription` field as a
//! scalar.
//!
//! # Examples
//!
//! ```
//! use bayeux_tokio_http::protocol::{self, HandshakeRequestBuilder};
//!
//! let mut builder = HandshakeRequestBuilder::new();
//! builder.add_version(protocol::BAYEUX_VERSION).unwrap();
//! builder
//!     .add_supported_connection_type(protocol::CONNECTION_TYPE_LONG_POLLING)
//!     .unwrap();
//! let batch = builder.build().unwrap();
//! assert_eq!(batch.len(), 1);
//! ```

use crate::error::{
    BadConnectionTypeError, BadConnectionVersionError, BayeuxError, EmptySliceError,
    InvalidChannelError, Result,
};
use crate::protocol::channel::{
    META_CONNECT, META_DISCONNECT, META_HANDSHAKE, META_SUBSCRIBE, META_UNSUBSCRIBE,
};
use crate::protocol::{is_supported_connection_type, Channel, Message};

fn validate_version(version: &str) -> Result<(), BadConnectionVersionError> {
    let invalid = || BadConnectionVersionError {
        version: version.to_string(),
    };
    if version.is_empty() {
        return Err(invalid());
    }
    let major = version.split('.').next().unwrap_or_default();
    major.parse::<u32>().map_err(|_| invalid())?;
    Ok(())
}

fn validate_connection_type(connection_type: &str) -> Result<(), BadConnectionTypeError> {
    if is_supported_connection_type(connection_type) {
        Ok(())
    } else {
        Err(BadConnectionTypeError {
            connection_type: connection_type.to_string(),
        })
    }
}

/// Builds `/meta/handshake` requests.
///
/// See <https://docs.cometd.org/current/reference/#_handshake_request>.
#[derive(Debug, Default)]
pub struct HandshakeRequestBuilder {
    version: String,
    supported_connection_types: Vec<String>,
    minimum_version: Option<String>,
}

impl HandshakeRequestBuilder {
    /// A builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a connection type to the server.
    ///
    /// The type must come from the closed set of standard Bayeux connection
    /// types; duplicates are silently ignored.
    pub fn add_supported_connection_type(
        &mut self,
        connection_type: &str,
    ) -> Result<(), BadConnectionTypeError> {
        validate_connection_type(connection_type)?;
        if !self
            .supported_connection_types
            .iter()
            .any(|ct| ct == connection_type)
        {
            self.supported_connection_types
                .push(connection_type.to_string());
        }
        Ok(())
    }

    /// Set the protocol version the client speaks.
    ///
    /// The major component must be a base-10 integer.
    pub fn add_version(&mut self, version: &str) -> Result<(), BadConnectionVersionError> {
        validate_version(version)?;
        self.version = version.to_string();
        Ok(())
    }

    /// Set the minimum protocol version the client accepts.
    pub fn add_minimum_version(&mut self, version: &str) -> Result<(), BadConnectionVersionError> {
        validate_version(version)?;
        self.minimum_version = Some(version.to_string());
        Ok(())
    }

    /// The finished handshake batch.
    ///
    /// # Errors
    ///
    /// [`BayeuxError::NoSupportedConnectionTypes`] without at least one
    /// connection type, [`BayeuxError::NoVersion`] without a version.
    pub fn build(self) -> Result<Vec<Message>> {
        if self.supported_connection_types.is_empty() {
            return Err(BayeuxError::NoSupportedConnectionTypes);
        }
        if self.version.is_empty() {
            return Err(BayeuxError::NoVersion);
        }
        let mut message = Message::new(Channel::from(META_HANDSHAKE));
        message.version = Some(self.version);
        message.minimum_version = self.minimum_version;
        message.supported_connection_types = Some(self.supported_connection_types);
        Ok(vec![message])
    }
}

/// Builds `/meta/connect` requests.
///
/// See <https://docs.cometd.org/current/reference/#_connect_request>.
#[derive(Debug, Default)]
pub struct ConnectRequestBuilder {
    client_id: String,
    connection_type: String,
}

impl ConnectRequestBuilder {
    /// A builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session token assigned at handshake.
    pub fn add_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    /// Set the connection type this poll uses.
    pub fn add_connection_type(
        &mut self,
        connection_type: &str,
    ) -> Result<(), BadConnectionTypeError> {
        validate_connection_type(connection_type)?;
        self.connection_type = connection_type.to_string();
        Ok(())
    }

    /// The finished connect batch.
    pub fn build(self) -> Result<Vec<Message>> {
        if self.client_id.is_empty() {
            return Err(BayeuxError::MissingClientId);
        }
        if self.connection_type.is_empty() {
            return Err(BayeuxError::MissingConnectionType);
        }
        let mut message = Message::new(Channel::from(META_CONNECT));
        message.client_id = Some(self.client_id);
        message.connection_type = Some(self.connection_type);
        Ok(vec![message])
    }
}

/// Builds `/meta/subscribe` requests, one envelope per channel.
///
/// See <https://docs.cometd.org/current/reference/#_subscribe_request>.
#[derive(Debug, Default)]
pub struct SubscribeRequestBuilder {
    client_id: String,
    subscriptions: Vec<Channel>,
}

impl SubscribeRequestBuilder {
    /// A builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session token assigned at handshake.
    pub fn add_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    /// Add a channel to subscribe to.
    ///
    /// Channels are validated and deduplicated in insertion order.
    pub fn add_subscription(&mut self, channel: Channel) -> Result<(), InvalidChannelError> {
        if !channel.is_valid() {
            return Err(InvalidChannelError { channel });
        }
        if !self.subscriptions.contains(&channel) {
            self.subscriptions.push(channel);
        }
        Ok(())
    }

    /// The finished subscribe batch, one envelope per channel.
    pub fn build(self) -> Result<Vec<Message>> {
        if self.client_id.is_empty() {
            return Err(BayeuxError::MissingClientId);
        }
        if self.subscriptions.is_empty() {
            return Err(EmptySliceError {
                kind: "subscriptions",
            }
            .into());
        }
        Ok(build_subscription_batch(
            META_SUBSCRIBE,
            self.client_id,
            self.subscriptions,
        ))
    }
}

/// Builds `/meta/unsubscribe` requests, one envelope per channel.
///
/// See <https://docs.cometd.org/current/reference/#_unsubscribe_request>.
#[derive(Debug, Default)]
pub struct UnsubscribeRequestBuilder {
    client_id: String,
    subscriptions: Vec<Channel>,
}

impl UnsubscribeRequestBuilder {
    /// A builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session token assigned at handshake.
    pub fn add_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    /// Add a channel to unsubscribe from.
    ///
    /// Channels are validated and deduplicated in insertion order.
    pub fn add_subscription(&mut self, channel: Channel) -> Result<(), InvalidChannelError> {
        if !channel.is_valid() {
            return Err(InvalidChannelError { channel });
        }
        if !self.subscriptions.contains(&channel) {
            self.subscriptions.push(channel);
        }
        Ok(())
    }

    /// The finished unsubscribe batch, one envelope per channel.
    pub fn build(self) -> Result<Vec<Message>> {
        if self.client_id.is_empty() {
            return Err(BayeuxError::MissingClientId);
        }
        if self.subscriptions.is_empty() {
            return Err(EmptySliceError {
                kind: "subscriptions",
            }
            .into());
        }
        Ok(build_subscription_batch(
            META_UNSUBSCRIBE,
            self.client_id,
            self.subscriptions,
        ))
    }
}

fn build_subscription_batch(
    channel: &str,
    client_id: String,
    subscriptions: Vec<Channel>,
) -> Vec<Message> {
    subscriptions
        .into_iter()
        .map(|subscription| {
            let mut message = Message::new(Channel::from(channel));
            message.client_id = Some(client_id.clone());
            message.subscription = Some(subscription);
            message
        })
        .collect()
}

/// Builds `/meta/disconnect` requests.
///
/// See <https://docs.cometd.org/current/reference/#_bayeux_meta_disconnect>.
#[derive(Debug, Default)]
pub struct DisconnectRequestBuilder {
    client_id: String,
}

impl DisconnectRequestBuilder {
    /// A builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session token assigned at handshake.
    pub fn add_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    /// The finished disconnect batch.
    pub fn build(self) -> Result<Vec<Message>> {
        if self.client_id.is_empty() {
            return Err(BayeuxError::MissingClientId);
        }
        let mut message = Message::new(Channel::from(META_DISCONNECT));
        message.client_id = Some(self.client_id);
        Ok(vec![message])
    }
}
