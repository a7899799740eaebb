//! The Bayeux message envelope, server advice, and error-field parsing.
//!
//! Messages serialize to the camelCase JSON envelope the protocol defines
//! and are always carried on the wire as a JSON array, even for a single
//! message. The `data` payload is preserved as raw JSON and never parsed
//! here; extensions and subscribers decide what to make of it.
//!
//! # Examples
//!
//! ```
//! use bayeux_tokio_http::protocol::{Message, MessageError};
//!
//! let message = Message {
//!     error: Some("404:/foo/bar:Unknown Channel".to_string()),
//!     ..Message::default()
//! };
//! let parsed = message.parse_error().unwrap();
//! assert_eq!(parsed.code, 404);
//! assert_eq!(parsed.args, vec!["/foo/bar".to_string()]);
//! assert_eq!(parsed.message, "Unknown Channel");
//! ```
//!
//! # Specification
//!
//! See <https://docs.cometd.org/current/reference/#_bayeux> for the envelope
//! fields and <https://docs.cometd.org/current/reference/#_concepts_channels>
//! for the error format.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{MessageUnparsableError, TimestampUnparsableError};
use crate::protocol::Channel;

/// The fixed timestamp profile messages carry: `YYYY-MM-DDTHH:MM:SS.ss`,
/// interpreted as UTC.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const TIMESTAMP_LEN: usize = 22;

/// A message received from or sent to a Bayeux server.
///
/// Every field except `channel` is optional on the wire; which ones are
/// required depends on the channel and direction. The request builders in
/// [`crate::protocol::builders`] produce envelopes with the right fields
/// populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Message {
    /// The identifier of this specific message, echoed back by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The channel the message was sent on. Required on every message.
    pub channel: Channel,
    /// The session token identifying this client, assigned at handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// The event payload, preserved as raw JSON and never parsed here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    /// The protocol version offered during handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// The minimum protocol version acceptable during handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    /// The connection types offered during handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,
    /// The connection type in use, sent on `/meta/connect`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// Message timestamp in the `YYYY-MM-DDTHH:MM:SS.ss` profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Whether the request this message responds to succeeded. Required on
    /// meta-channel responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    /// Whether authentication succeeded, when the server reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_successful: Option<bool>,
    /// The channel being subscribed to or unsubscribed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Channel>,
    /// A failure description in `code:args:message` format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extension data. Lazily created; see [`Message::ext_mut`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<HashMap<String, Value>>,
    /// Server guidance on how and when to reconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
}

impl Message {
    /// A message addressed to `channel` with no other fields set.
    pub fn new(channel: Channel) -> Self {
        Message {
            channel,
            ..Message::default()
        }
    }

    /// Whether the server marked this response successful.
    ///
    /// A missing `successful` field counts as failure; the protocol requires
    /// the field on meta-channel responses.
    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }

    /// The extension mapping, if the message carries one.
    pub fn ext(&self) -> Option<&HashMap<String, Value>> {
        self.ext.as_ref()
    }

    /// The extension mapping, created empty if the message has none yet.
    ///
    /// This is the mutation point for extensions: anything inserted here
    /// before framing is visible on the wire.
    pub fn ext_mut(&mut self) -> &mut HashMap<String, Value> {
        self.ext.get_or_insert_with(HashMap::new)
    }

    /// Parse the `error` field into its structured form.
    ///
    /// # Errors
    ///
    /// Returns [`MessageUnparsableError`] when the field is absent or does
    /// not follow the `code:args:message` format.
    pub fn parse_error(&self) -> Result<MessageError, MessageUnparsableError> {
        self.error.as_deref().unwrap_or_default().parse()
    }

    /// Parse the `timestamp` field as a UTC instant.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampUnparsableError`] on any deviation from the
    /// `YYYY-MM-DDTHH:MM:SS.ss` profile.
    pub fn timestamp_as_time(&self) -> Result<DateTime<Utc>, TimestampUnparsableError> {
        let raw = self.timestamp.as_deref().unwrap_or_default();
        let unparsable = || TimestampUnparsableError {
            raw: raw.to_string(),
        };
        if raw.len() != TIMESTAMP_LEN || raw.as_bytes().get(19) != Some(&b'.') {
            return Err(unparsable());
        }
        let parsed =
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_PARSE_FORMAT).map_err(|_| unparsable())?;
        Ok(parsed.and_utc())
    }
}

/// Format a UTC instant in the timestamp profile messages carry.
///
/// The profile has 10 ms resolution; anything finer is truncated.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    format!(
        "{}.{:02}",
        time.format("%Y-%m-%dT%H:%M:%S"),
        time.timestamp_subsec_millis() / 10
    )
}

/// The `reconnect` guidance a server can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reconnect {
    /// Reconnect with another `/meta/connect`, keeping the same session.
    Retry,
    /// Start a new session with another `/meta/handshake`.
    Handshake,
    /// Do not attempt to retry or handshake.
    None,
}

/// Server guidance attached to a response message.
///
/// `timeout` and `interval` are in integer milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Advice {
    /// How the client should re-establish connectivity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<Reconnect>,
    /// How long the server will hold a `/meta/connect` open, in ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    /// How long the client should wait before the next `/meta/connect`, in ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Whether the server detected multiple clients sharing this session.
    #[serde(
        rename = "multiple-clients",
        skip_serializing_if = "Option::is_none"
    )]
    pub multiple_clients: Option<bool>,
    /// Alternate servers to try, in preference order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
}

impl Advice {
    /// Whether the server forbade any further retry or handshake.
    pub fn must_not_retry_or_handshake(&self) -> bool {
        self.reconnect == Some(Reconnect::None)
    }

    /// Whether the server permits reconnecting with the same session.
    pub fn should_retry(&self) -> bool {
        self.reconnect == Some(Reconnect::Retry)
    }

    /// Whether the server requires a new handshake.
    pub fn should_handshake(&self) -> bool {
        self.reconnect == Some(Reconnect::Handshake)
    }

    /// The `timeout` field as a duration. Missing or negative counts as zero.
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(0).max(0) as u64)
    }

    /// The `interval` field as a duration. Missing or negative counts as zero.
    pub fn interval_as_duration(&self) -> Duration {
        Duration::from_millis(self.interval.unwrap_or(0).max(0) as u64)
    }
}

/// The parsed form of a message `error` field.
///
/// The wire format is `CODE:ARG1,ARG2,…:HUMAN_MESSAGE`. An empty args field
/// parses as a single empty-string argument, so formatting a parsed error
/// reproduces the original string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError {
    /// The numeric error code.
    pub code: i32,
    /// The ordered argument strings.
    pub args: Vec<String>,
    /// The human-readable description.
    pub message: String,
}

impl FromStr for MessageError {
    type Err = MessageUnparsableError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let unparsable = || MessageUnparsableError {
            raw: raw.to_string(),
        };
        let mut parts = raw.splitn(3, ':');
        let (code, args, message) = match (parts.next(), parts.next(), parts.next()) {
            (Some(code), Some(args), Some(message)) => (code, args, message),
            _ => return Err(unparsable()),
        };
        let code = code.parse().map_err(|_| unparsable())?;
        Ok(MessageError {
            code,
            args: args.split(',').map(str::to_string).collect(),
            message: message.to_string(),
        })
    }
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.args.join(","), self.message)
    }
}
