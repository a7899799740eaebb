//! The receiving half of a channel subscription.
//!
//! A [`Subscription`] is what [`Client::subscribe`](crate::Client::subscribe)
//! hands back: an async stream of message batches for one channel. Batches
//! preserve the server's ordering within a single poll response, and
//! delivery across polls is serialized per channel, so consuming a
//! subscription sees events in the order the server emitted them.
//!
//! # Examples
//!
//! ## Using `next`
//!
//! ```ignore
//! let mut subscription = client.subscribe("/foo/bar").await?;
//! while let Some(batch) = subscription.next().await {
//!     for message in batch {
//!         println!("event: {:?}", message.data);
//!     }
//! }
//! ```
//!
//! ## Using `Stream` combinators
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let subscription = client.subscribe("/foo/bar").await?;
//! let mut flattened = subscription.flat_map(futures::stream::iter);
//! while let Some(message) = flattened.next().await {
//!     // one message at a time
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::client::registry::BatchSink;
use crate::protocol::{Channel, Message};

/// A live subscription to one channel.
///
/// The subscription ends (`next` returns `None`) when the channel is
/// unsubscribed or the client shuts down. Dropping a subscription makes the
/// engine discard further batches for its channel; it does not by itself
/// send `/meta/unsubscribe`, use
/// [`Client::unsubscribe`](crate::Client::unsubscribe) for that.
#[derive(Debug)]
pub struct Subscription {
    channel: Channel,
    receiver: mpsc::Receiver<Vec<Message>>,
}

impl Subscription {
    /// Wire a new subscription for `channel`, returning the sink half the
    /// registry stores and the subscription the caller keeps.
    pub(crate) fn channel_pair(channel: Channel, capacity: usize) -> (BatchSink, Subscription) {
        let (sink, receiver) = mpsc::channel(capacity);
        (sink, Subscription { channel, receiver })
    }

    /// The channel this subscription receives.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The next batch of messages, in server order.
    ///
    /// Returns `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Vec<Message>> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Vec<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A subscription wrapped for `StreamExt`-heavy call sites.
///
/// Identical delivery semantics to [`Subscription`]; this variant just owns
/// a [`ReceiverStream`] so it composes without a manual `poll_next`.
#[derive(Debug)]
pub struct SubscriptionStream {
    channel: Channel,
    receiver: ReceiverStream<Vec<Message>>,
}

impl SubscriptionStream {
    /// The channel this stream receives.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl From<Subscription> for SubscriptionStream {
    fn from(subscription: Subscription) -> Self {
        SubscriptionStream {
            channel: subscription.channel,
            receiver: ReceiverStream::new(subscription.receiver),
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Vec<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn batches_arrive_in_order() {
        let channel = Channel::from("/foo/bar");
        let (sink, mut subscription) = Subscription::channel_pair(channel.clone(), 4);
        assert_eq!(subscription.channel(), &channel);

        for id in ["1", "2"] {
            let mut message = Message::new(channel.clone());
            message.id = Some(id.to_string());
            sink.send(vec![message]).await.unwrap();
        }

        let first = subscription.next().await.unwrap();
        assert_eq!(first[0].id.as_deref(), Some("1"));
        let second = subscription.next().await.unwrap();
        assert_eq!(second[0].id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn closes_when_the_sink_is_dropped() {
        let (sink, mut subscription) = Subscription::channel_pair(Channel::from("/foo/bar"), 1);
        drop(sink);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_wrapper_yields_the_same_batches() {
        let channel = Channel::from("/foo/bar");
        let (sink, subscription) = Subscription::channel_pair(channel.clone(), 1);
        let mut stream = SubscriptionStream::from(subscription);
        assert_eq!(stream.channel(), &channel);

        sink.send(vec![Message::new(channel)]).await.unwrap();
        drop(sink);
        let batch = stream.next().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(stream.next().await.is_none());
    }
}
