//! Bayeux channel names, classification, and wildcard matching.
//!
//! A channel is "a string that looks like a URL path such as `/foo/bar`,
//! `/meta/connect`, or `/service/chat`". Channels come in three kinds:
//! *meta* channels carry protocol control, *service* channels carry
//! request/response traffic, and everything else is a *broadcast* channel
//! carrying events.
//!
//! Wildcard patterns are only valid in the final segment: `/foo/*` matches
//! one trailing segment, `/foo/**` matches any trailing path.
//!
//! # Examples
//!
//! ```
//! use bayeux_tokio_http::protocol::{Channel, ChannelType};
//!
//! let channel = Channel::from("/meta/connect");
//! assert_eq!(channel.channel_type(), ChannelType::Meta);
//!
//! let pattern = Channel::from("/foo/*");
//! assert!(pattern.matches_str("/foo/bar"));
//! assert!(!pattern.matches_str("/foo/bar/baz"));
//! ```
//!
//! # Specification
//!
//! See <https://docs.cometd.org/current/reference/#_concepts_channels>.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The channel for the first message a new client sends.
pub const META_HANDSHAKE: &str = "/meta/handshake";
/// The channel used for connect messages after a successful handshake.
pub const META_CONNECT: &str = "/meta/connect";
/// The channel used for disconnect messages.
pub const META_DISCONNECT: &str = "/meta/disconnect";
/// The channel used by a client to subscribe to channels.
pub const META_SUBSCRIBE: &str = "/meta/subscribe";
/// The channel used by a client to unsubscribe from channels.
pub const META_UNSUBSCRIBE: &str = "/meta/unsubscribe";

const META_PREFIX: &str = "/meta/";
const SERVICE_PREFIX: &str = "/service/";

/// The three kinds of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Channels starting with `/meta/`, carrying protocol control.
    Meta,
    /// Channels starting with `/service/`.
    Service,
    /// All other channels, carrying events.
    Broadcast,
}

/// A Bayeux channel name.
///
/// Equality, hashing, and ordering are byte-identity on the underlying
/// string. The type serializes as a bare JSON string.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// The channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the channel name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The kind of channel this name denotes.
    pub fn channel_type(&self) -> ChannelType {
        if self.0.starts_with(META_PREFIX) {
            ChannelType::Meta
        } else if self.0.starts_with(SERVICE_PREFIX) {
            ChannelType::Service
        } else {
            ChannelType::Broadcast
        }
    }

    /// Whether the channel ends with `*` or `**`.
    ///
    /// See <https://docs.cometd.org/current/reference/#_concepts_channels_wild>.
    pub fn has_wildcard(&self) -> bool {
        self.0.ends_with('*')
    }

    /// Whether this is a well-formed channel name.
    ///
    /// A channel must begin with `/`. If it contains `*`, the wildcard must
    /// form the entire final segment, as either `*` or `**`; a `*` anywhere
    /// else makes the channel invalid.
    pub fn is_valid(&self) -> bool {
        if !self.0.starts_with('/') {
            return false;
        }
        if !self.0.contains('*') {
            return true;
        }
        let Some(index) = self.0.rfind('/') else {
            return false;
        };
        let (head, tail) = (&self.0[..index], &self.0[index + 1..]);
        !head.contains('*') && matches!(tail, "*" | "**")
    }

    /// Whether `other` matches this channel, treating `self` as the pattern.
    ///
    /// Without a wildcard this is byte equality. With one, the candidate
    /// must share the pattern's prefix up to the final `/`; `*` then matches
    /// a single trailing segment and `**` matches any trailing path.
    pub fn matches(&self, other: &Channel) -> bool {
        self.matches_str(other.as_str())
    }

    /// [`Channel::matches`] against a raw string.
    pub fn matches_str(&self, other: &str) -> bool {
        if self.has_wildcard() {
            self.match_against_wildcards(other)
        } else {
            self.0 == other
        }
    }

    fn match_against_wildcards(&self, other: &str) -> bool {
        let Some(index) = self.0.rfind('/') else {
            return false;
        };
        // The prefix includes the final '/', so the remainder of `other` is
        // exactly what the wildcard segment has to account for.
        let prefix = &self.0[..=index];
        let Some(rest) = other.strip_prefix(prefix) else {
            return false;
        };
        match &self.0[index + 1..] {
            "*" => !rest.contains('/'),
            "**" => true,
            // A final segment like `*foo` or `***` never matches anything.
            _ => false,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        Channel(value.to_string())
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        Channel(value)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Channel {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Channel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_channel_types() {
        assert_eq!(
            Channel::from(META_HANDSHAKE).channel_type(),
            ChannelType::Meta
        );
        assert_eq!(
            Channel::from("/service/chat").channel_type(),
            ChannelType::Service
        );
        assert_eq!(
            Channel::from("/foo/bar").channel_type(),
            ChannelType::Broadcast
        );
    }

    #[test]
    fn validity_requires_leading_slash() {
        assert!(Channel::from("/foo/bar").is_valid());
        assert!(!Channel::from("foo/bar").is_valid());
        assert!(!Channel::from("").is_valid());
    }

    #[test]
    fn validity_constrains_wildcards_to_the_final_segment() {
        assert!(Channel::from("/foo/*").is_valid());
        assert!(Channel::from("/foo/**").is_valid());
        assert!(!Channel::from("/foo/***").is_valid());
        assert!(!Channel::from("/foo/*a").is_valid());
        assert!(!Channel::from("/fo*o/bar").is_valid());
        assert!(!Channel::from("/*/bar").is_valid());
    }

    #[test]
    fn wildcard_free_match_is_byte_equality() {
        let channel = Channel::from("/foo/bar");
        assert!(channel.matches(&Channel::from("/foo/bar")));
        assert!(!channel.matches_str("/foo/baz"));
        assert!(!channel.matches_str("/foo/bar/"));
    }

    #[test]
    fn valid_channels_match_themselves() {
        for name in ["/foo/bar", "/meta/connect", "/service/chat", "/a/b/c"] {
            let channel = Channel::from(name);
            assert!(channel.is_valid());
            assert!(channel.matches_str(name));
        }
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        let pattern = Channel::from("/foo/*");
        assert!(pattern.matches_str("/foo/bar"));
        assert!(!pattern.matches_str("/foo/bar/baz"));
        assert!(!pattern.matches_str("/other/bar"));
    }

    #[test]
    fn double_wildcard_matches_any_tail() {
        let pattern = Channel::from("/foo/**");
        assert!(pattern.matches_str("/foo/bar"));
        assert!(pattern.matches_str("/foo/bar/baz"));
        assert!(!pattern.matches_str("/other/bar"));
    }

    #[test]
    fn malformed_wildcard_segments_never_match() {
        assert!(!Channel::from("/foo/***").matches_str("/foo/bar"));
        assert!(!Channel::from("/foo/*a").matches_str("/foo/bar"));
    }
}
