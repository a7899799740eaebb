//! Core Bayeux protocol types.
//!
//! Everything in this module is pure data: no I/O, no runtime. The
//! submodules cover the three layers of the wire protocol:
//!
//! - **[`channel`]** - channel names, their classification, and wildcard
//!   matching
//! - **[`message`]** - the message envelope carried in both directions,
//!   server advice, and the `code:args:message` error format
//! - **[`builders`]** - validated construction of the five meta-channel
//!   request batches
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Channel`] | Validated Bayeux channel name |
//! | [`Message`] | Protocol message envelope |
//! | [`Advice`] | Server reconnection guidance |
//! | [`MessageError`] | Parsed form of a message `error` field |
//! | [`HandshakeRequestBuilder`] | `/meta/handshake` request construction |

pub mod builders;
pub mod channel;
pub mod message;

pub use builders::{
    ConnectRequestBuilder, DisconnectRequestBuilder, HandshakeRequestBuilder,
    SubscribeRequestBuilder, UnsubscribeRequestBuilder,
};
pub use channel::{Channel, ChannelType};
pub use message::{format_timestamp, Advice, Message, MessageError, Reconnect};

/// The Bayeux protocol version this client speaks.
pub const BAYEUX_VERSION: &str = "1.0";

/// The `long-polling` connection type. The only one implemented at runtime.
pub const CONNECTION_TYPE_LONG_POLLING: &str = "long-polling";

/// The `callback-polling` connection type. Accepted during handshake
/// negotiation for compatibility, not implemented at runtime.
pub const CONNECTION_TYPE_CALLBACK_POLLING: &str = "callback-polling";

/// The `iframe` connection type. Accepted during handshake negotiation for
/// compatibility, not implemented at runtime.
pub const CONNECTION_TYPE_IFRAME: &str = "iframe";

/// Whether `connection_type` belongs to the closed set of standard Bayeux
/// connection types.
pub fn is_supported_connection_type(connection_type: &str) -> bool {
    matches!(
        connection_type,
        CONNECTION_TYPE_LONG_POLLING | CONNECTION_TYPE_CALLBACK_POLLING | CONNECTION_TYPE_IFRAME
    )
}
