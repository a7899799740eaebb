//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BayeuxError;
use crate::extension::MessageExtension;
use crate::transport::HttpTransport;

/// Decides whether the polling loop survives a protocol error.
///
/// The error is still published on the client's error stream either way;
/// returning `true` keeps the loop running afterwards.
pub type IgnoreErrorPredicate = Arc<dyn Fn(&BayeuxError) -> bool + Send + Sync>;

/// Configuration for [`Client`](crate::Client).
///
/// # Examples
///
/// ```
/// use bayeux_tokio_http::{BayeuxError, ClientConfig};
///
/// let config = ClientConfig::default()
///     .with_ignore_error(|err| matches!(err, BayeuxError::SubscriptionFailed(_)));
/// assert_eq!(config.request_buffer, 10);
/// ```
pub struct ClientConfig {
    /// Depth of the subscribe and unsubscribe request queues.
    pub request_buffer: usize,
    /// Capacity of each subscription's batch buffer.
    pub delivery_buffer: usize,
    /// Deadline for handshake, subscribe, unsubscribe, and disconnect
    /// requests. `/meta/connect` polls take their deadline from server
    /// advice instead. `None` leaves it to the transport.
    pub request_timeout: Option<Duration>,
    /// Errors this predicate accepts are published but don't stop polling.
    pub ignore_error: Option<IgnoreErrorPredicate>,
    /// Extensions registered before the client starts.
    pub extensions: Vec<Arc<dyn MessageExtension>>,
    /// Overrides the default `reqwest`-based transport.
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_buffer: 10,
            delivery_buffer: 100,
            request_timeout: Some(Duration::from_secs(30)),
            ignore_error: None,
            extensions: Vec::new(),
            transport: None,
        }
    }
}

impl ClientConfig {
    /// Use `transport` instead of the default `reqwest` executor.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Keep polling through errors `predicate` accepts.
    pub fn with_ignore_error(
        mut self,
        predicate: impl Fn(&BayeuxError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.ignore_error = Some(Arc::new(predicate));
        self
    }

    /// Register `extension` when the client is built.
    pub fn with_extension(mut self, extension: Arc<dyn MessageExtension>) -> Self {
        self.extensions.push(extension);
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("request_buffer", &self.request_buffer)
            .field("delivery_buffer", &self.delivery_buffer)
            .field("request_timeout", &self.request_timeout)
            .field("ignore_error", &self.ignore_error.is_some())
            .field("extensions", &self.extensions.len())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ClientConfig::default();
        assert_eq!(config.request_buffer, 10);
        assert_eq!(config.delivery_buffer, 100);
        assert!(config.ignore_error.is_none());
        assert!(config.extensions.is_empty());
    }

    #[test]
    fn predicate_is_applied() {
        let config = ClientConfig::default()
            .with_ignore_error(|err| matches!(err, BayeuxError::ClientNotConnected));
        let predicate = config.ignore_error.unwrap();
        assert!(predicate(&BayeuxError::ClientNotConnected));
        assert!(!predicate(&BayeuxError::TooManyMessages));
    }
}
