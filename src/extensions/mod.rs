//! Extension implementations shipped with the crate.
//!
//! These are concrete users of the [`MessageExtension`] interface, not part
//! of the core protocol flow. They double as worked examples for writing
//! your own.
//!
//! [`MessageExtension`]: crate::extension::MessageExtension

pub mod replay;

pub use replay::{MemoryReplayStore, ReplayExtension, ReplayStore};
