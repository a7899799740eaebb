//! The message extension interface.
//!
//! Extensions rewrite messages as they cross the wire boundary: `outgoing`
//! runs on every message of every request batch **before** JSON framing, so
//! mutations to the `ext` mapping are visible on the wire; `incoming` runs
//! on every decoded response message **after** JSON parsing. The pipeline
//! runs extensions in registration order on both directions, and each
//! extension sees each message exactly once per direction.
//!
//! Extensions must treat message identity as local to the invocation: a
//! message reference is only valid for the duration of the hook, so state
//! worth keeping belongs in the extension itself.
//!
//! The crate ships a ready-made implementation in
//! [`crate::extensions::replay`].

use crate::protocol::Message;

/// A hook pair that rewrites every outgoing and incoming message.
///
/// Hooks take `&self`: an extension is shared with the client's background
/// task, so mutable state needs interior mutability (the replay extension
/// uses an atomic flag plus a locked map).
pub trait MessageExtension: Send + Sync {
    /// A stable, unique name for this extension.
    ///
    /// Registration rejects a second extension with the same name.
    fn name(&self) -> &str;

    /// Rewrite a message about to be framed and sent.
    fn outgoing(&self, message: &mut Message);

    /// Rewrite a message just decoded from a response.
    fn incoming(&self, message: &mut Message);

    /// Called once when the extension is registered with a client.
    fn registered(&self, _name: &str) {}

    /// Called once when the extension is removed from a client.
    fn unregistered(&self) {}
}
