#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Bayeux over HTTP long-polling
//!
//! This crate implements a client for the Bayeux 1.0 publish/subscribe
//! protocol over the `long-polling` transport, as served by CometD and
//! Faye.
//!
//! Based on the [CometD reference](https://docs.cometd.org/current/reference/#_bayeux).
//!
//! ## Overview
//!
//! A Bayeux session is one long conversation over repeated HTTP POSTs:
//!
//! 1. **Handshake** - `/meta/handshake` negotiates a session and returns a
//!    `clientId`
//! 2. **Polling** - exactly one `/meta/connect` request is held open by the
//!    server and answered with pending events
//! 3. **Subscriptions** - `/meta/subscribe` and `/meta/unsubscribe` manage
//!    which channels deliver events
//! 4. **Advice** - every response may carry reconnection guidance the
//!    client must honor
//!
//! [`Client`] runs this conversation on a background task and routes
//! arriving events to per-channel [`Subscription`]s. The lower layers
//! (the state machine, the request builders, the pluggable
//! [`HttpTransport`]) are public too, for callers who need to drive the
//! protocol themselves.
//!
//! ## Module Structure
//!
//! - **[protocol]** - Channels, message envelopes, advice, request builders
//! - **[client]** - State machine, protocol client, registry, polling engine
//! - **[transport]** - The pluggable HTTP request executor
//! - **[extension]** - The message extension interface
//! - **[extensions]** - Extension implementations shipped with the crate
//! - **[error]** - Error types and result handling

pub mod client;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod protocol;
pub mod transport;

pub use client::{
    BayeuxClient, Client, ClientConfig, ConnectionState, Subscription, SubscriptionStream,
};
pub use error::{BayeuxError, Result};
pub use extension::MessageExtension;
pub use protocol::{Advice, Channel, ChannelType, Message, MessageError, Reconnect};
pub use transport::{HttpTransport, ReqwestTransport, TransportError, TransportResponse};
