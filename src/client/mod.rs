//! The Bayeux client, low-level and high-level.
//!
//! Two layers live here. [`BayeuxClient`] is the low-level protocol
//! client: one method per meta-channel operation, each performing a single
//! request/response cycle against the injected transport. [`Client`] is
//! the high-level engine most callers want: it owns a background polling
//! task that keeps exactly one `/meta/connect` outstanding, reacts to
//! server advice, and fans incoming events out to per-channel
//! [`Subscription`]s.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── config       - ClientConfig and the ignore-error predicate
//! ├── engine       - Client, the polling loop and its queues
//! ├── registry     - channel → sink routing table
//! ├── session      - BayeuxClient, the five protocol operations
//! ├── state        - connection state machine, session token
//! └── subscription - the receiving half handed to callers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | High-level client with background polling |
//! | [`BayeuxClient`] | Low-level, one-request-per-call protocol client |
//! | [`ClientConfig`] | Client configuration options |
//! | [`Subscription`] | Ordered batch stream for one channel |
//! | [`ConnectionStateMachine`] | Atomic handshake/connect lifecycle |

pub mod config;
pub mod engine;
pub mod registry;
pub mod session;
pub mod state;
pub mod subscription;

pub use config::{ClientConfig, IgnoreErrorPredicate};
pub use engine::Client;
pub use registry::{BatchSink, SubscriptionRegistry};
pub use session::BayeuxClient;
pub use state::{ConnectionState, ConnectionStateMachine, Event, SessionState};
pub use subscription::{Subscription, SubscriptionStream};
