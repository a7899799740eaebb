//! The high-level client: queues, advice timer, and the polling loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Client                             │
//! │                                                             │
//! │  subscribe()   ──► subscribe queue ───┐                     │
//! │  unsubscribe() ──► unsubscribe queue ─┤                     │
//! │  disconnect()  ──► shutdown signal ───┤                     │
//! │                                       ▼                     │
//! │                                  polling task               │
//! │                                       │                     │
//! │      connect slot (1) ◄── advice timer│                     │
//! │      handshake slot (1) ◄─────────────┤                     │
//! │                                       ▼                     │
//! │                                 BayeuxClient ──► transport  │
//! │                                       │                     │
//! │        subscription registry ◄── fan-out per channel        │
//! │                                       │                     │
//! │  Subscription::next() ◄── batch sinks ┘                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The polling task is the only place protocol operations run, so state
//! transitions and registry mutations are serialized. Callers talk to it
//! exclusively through bounded queues. The "one outstanding poll" rule is
//! the one-slot connect queue: enqueueing is a non-blocking `try_send`, and
//! dropping the enqueue when the slot is already full is the correct
//! behavior, not a loss.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::client::config::{ClientConfig, IgnoreErrorPredicate};
use crate::client::registry::{BatchSink, SubscriptionRegistry};
use crate::client::session::BayeuxClient;
use crate::client::state::ConnectionState;
use crate::client::subscription::Subscription;
use crate::error::{BayeuxError, InvalidChannelError, Result, SubscriptionFailedError};
use crate::extension::MessageExtension;
use crate::protocol::channel::META_CONNECT;
use crate::protocol::{Advice, Channel, Message};
use crate::transport::{ReqwestTransport, TransportError};

/// Capacity of the internal `/meta/connect` message sink. The loop drains
/// it between polls, so it only ever holds a few batches.
const CONNECT_SINK_CAPACITY: usize = 16;

/// An `Instant` far enough in the future to act as a disarmed timer.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

struct SubscriptionRequest {
    channel: Channel,
    sink: BatchSink,
}

/// A high-level Bayeux client.
///
/// Construction wires the queues; [`Client::start`] performs the handshake
/// and spawns the polling task. Subscribing is observable through event
/// delivery only after the server confirms it; the returned
/// [`Subscription`] stays silent until then.
///
/// Dropping the client signals shutdown, which ends with an orderly
/// `/meta/disconnect`.
pub struct Client {
    session: Arc<BayeuxClient>,
    subscriptions: Arc<SubscriptionRegistry>,
    subscribe_tx: mpsc::Sender<SubscriptionRequest>,
    unsubscribe_tx: mpsc::Sender<Channel>,
    shutdown: CancellationToken,
    delivery_buffer: usize,
    ignore_error: Option<IgnoreErrorPredicate>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    subscribe_rx: mpsc::Receiver<SubscriptionRequest>,
    unsubscribe_rx: mpsc::Receiver<Channel>,
}

impl Client {
    /// A client for the Bayeux server at `server_address`, with defaults.
    pub fn new(server_address: &str) -> Result<Self> {
        Self::with_config(server_address, ClientConfig::default())
    }

    /// A client for the Bayeux server at `server_address`.
    pub fn with_config(server_address: &str, mut config: ClientConfig) -> Result<Self> {
        let endpoint = Url::parse(server_address)?;
        let transport = config
            .transport
            .take()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(endpoint)));

        let session = Arc::new(BayeuxClient::new(transport, config.request_timeout));
        for extension in config.extensions.drain(..) {
            session.use_extension(extension)?;
        }

        let (subscribe_tx, subscribe_rx) = mpsc::channel(config.request_buffer);
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::channel(config.request_buffer);

        Ok(Client {
            session,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            subscribe_tx,
            unsubscribe_tx,
            shutdown: CancellationToken::new(),
            delivery_buffer: config.delivery_buffer,
            ignore_error: config.ignore_error,
            worker: Mutex::new(Some(Worker {
                subscribe_rx,
                unsubscribe_rx,
            })),
        })
    }

    /// Begin the background process that talks to the server.
    ///
    /// The handshake runs first; if it fails, the error is published and
    /// the task stops. The returned stream carries every error the polling
    /// loop reports: fatal ones are followed by the stream closing,
    /// ignored ones (see [`ClientConfig::with_ignore_error`]) are not.
    ///
    /// Cancelling `cancel` aborts any in-flight request and stops the task
    /// without a protocol disconnect; use [`Client::disconnect`] for the
    /// orderly variant. Calling `start` a second time returns a closed
    /// stream.
    pub fn start(&self, cancel: CancellationToken) -> mpsc::Receiver<BayeuxError> {
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let Some(worker) = self.worker.lock().take() else {
            warn!("client already started");
            return errors_rx;
        };
        let engine = Engine {
            session: self.session.clone(),
            subscriptions: self.subscriptions.clone(),
            ignore_error: self.ignore_error.clone(),
            shutdown: self.shutdown.clone(),
            cancel,
            errors: errors_tx,
        };
        tokio::spawn(engine.run(worker));
        errors_rx
    }

    /// Queue a subscription to `channel`.
    ///
    /// The request is validated here; the protocol subscribe happens on the
    /// polling task, and events start flowing once the server confirms.
    pub async fn subscribe(&self, channel: impl Into<Channel>) -> Result<Subscription> {
        let channel = channel.into();
        if !channel.is_valid() {
            return Err(InvalidChannelError { channel }.into());
        }
        let (sink, subscription) = Subscription::channel_pair(channel.clone(), self.delivery_buffer);
        self.subscribe_tx
            .send(SubscriptionRequest { channel, sink })
            .await
            .map_err(|_| BayeuxError::ClientNotConnected)?;
        Ok(subscription)
    }

    /// Queue an unsubscription from `channel`.
    ///
    /// Once processed, the channel's sink is dropped and its
    /// [`Subscription`] ends. Unsubscribing a channel that was never
    /// subscribed is a no-op locally; the server may still complain.
    pub async fn unsubscribe(&self, channel: impl Into<Channel>) -> Result<()> {
        self.unsubscribe_tx
            .send(channel.into())
            .await
            .map_err(|_| BayeuxError::ClientNotConnected)
    }

    /// Publishing is reserved and fails immediately.
    ///
    /// Implementing it needs an outstanding-request slot separate from
    /// `/meta/connect`.
    pub async fn publish(&self, _channel: impl Into<Channel>, _data: serde_json::Value) -> Result<()> {
        Err(BayeuxError::PublishUnsupported)
    }

    /// Signal an orderly shutdown.
    ///
    /// The polling task finishes its current step, sends
    /// `/meta/disconnect`, and exits; queued requests are dropped and all
    /// subscriptions end. Idempotent.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    /// Register a message extension.
    pub fn use_extension(&self, extension: Arc<dyn MessageExtension>) -> Result<()> {
        self.session.use_extension(extension)
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// The current connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.session.current_state()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.current_state())
            .finish()
    }
}

/// The state owned by the polling task.
struct Engine {
    session: Arc<BayeuxClient>,
    subscriptions: Arc<SubscriptionRegistry>,
    ignore_error: Option<IgnoreErrorPredicate>,
    shutdown: CancellationToken,
    cancel: CancellationToken,
    errors: mpsc::Sender<BayeuxError>,
}

impl Engine {
    async fn run(self, mut worker: Worker) {
        if let Err(err) = self.session.handshake(&self.cancel).await {
            let _ = self.errors.send(err).await;
            return;
        }

        // The loop routes /meta/connect responses to itself through the
        // registry, like any other channel.
        let (connect_events_tx, connect_events_rx) = mpsc::channel(CONNECT_SINK_CAPACITY);
        if let Err(err) = self
            .subscriptions
            .add(Channel::from(META_CONNECT), connect_events_tx)
        {
            let _ = self.errors.send(err).await;
            return;
        }

        // Subscriptions requested before start go out as one batch.
        let mut pending = Vec::new();
        while let Ok(request) = worker.subscribe_rx.try_recv() {
            pending.push(request);
        }
        if !pending.is_empty() {
            if let Err(fatal) = self.subscribe_batch(pending).await {
                let _ = self.errors.send(fatal).await;
                return;
            }
        }

        let result = self.poll(&mut worker, connect_events_rx).await;
        match result {
            Ok(()) => {
                debug!("polling stopped; disconnecting");
                if let Err(err) = self.session.disconnect(&self.cancel).await {
                    let _ = self.errors.send(err).await;
                }
            }
            Err(err) => {
                let _ = self.errors.send(err).await;
            }
        }
    }

    async fn poll(
        &self,
        worker: &mut Worker,
        mut connect_events_rx: mpsc::Receiver<Vec<Message>>,
    ) -> Result<()> {
        let (connect_slot_tx, mut connect_slot_rx) = mpsc::channel::<()>(1);
        let (handshake_tx, mut handshake_rx) = mpsc::channel::<()>(1);
        let _ = connect_slot_tx.try_send(());

        let timer = tokio::time::sleep_until(far_future());
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),

                () = self.cancel.cancelled() => {
                    return Err(TransportError::Cancelled.into());
                }

                Some(request) = worker.subscribe_rx.recv() => {
                    let mut requests = vec![request];
                    while let Ok(more) = worker.subscribe_rx.try_recv() {
                        requests.push(more);
                    }
                    self.subscribe_batch(requests).await?;
                    let _ = connect_slot_tx.try_send(());
                }

                Some(channel) = worker.unsubscribe_rx.recv() => {
                    let mut channels = vec![channel];
                    while let Ok(more) = worker.unsubscribe_rx.try_recv() {
                        channels.push(more);
                    }
                    self.unsubscribe_batch(channels).await?;
                }

                Some(batch) = connect_events_rx.recv() => {
                    for message in &batch {
                        let advice = message.advice.clone().unwrap_or_default();
                        if advice.must_not_retry_or_handshake() {
                            warn!("server forbade retry and handshake; polling will quiesce");
                            continue;
                        }
                        if advice.should_handshake() {
                            let _ = handshake_tx.try_send(());
                        }
                        self.reset_timer(timer.as_mut(), &advice);
                    }
                }

                Some(()) = handshake_rx.recv() => {
                    debug!("server advice requested a new handshake");
                    if let Err(err) = self.session.rehandshake(&self.cancel).await {
                        self.report(err).await?;
                    }
                    let _ = connect_slot_tx.try_send(());
                }

                Some(()) = connect_slot_rx.recv() => {
                    match self.session.connect(&self.cancel).await {
                        Ok(messages) => self.fan_out(messages).await?,
                        Err(err) => {
                            self.report(err).await?;
                            let _ = connect_slot_tx.try_send(());
                        }
                    }
                }

                () = timer.as_mut() => {
                    timer.as_mut().reset(far_future());
                    let _ = connect_slot_tx.try_send(());
                }
            }
        }
    }

    fn reset_timer(
        &self,
        timer: std::pin::Pin<&mut tokio::time::Sleep>,
        advice: &Advice,
    ) {
        timer.reset(Instant::now() + advice.interval_as_duration());
    }

    /// Subscribe to every requested channel as one batch and, on success,
    /// register the sinks.
    async fn subscribe_batch(&self, requests: Vec<SubscriptionRequest>) -> Result<()> {
        let channels: Vec<Channel> = requests.iter().map(|r| r.channel.clone()).collect();
        match self.session.subscribe(&channels, &self.cancel).await {
            Ok(_) => {
                for request in requests {
                    if let Err(err) = self
                        .subscriptions
                        .add(request.channel.clone(), request.sink)
                    {
                        let err = SubscriptionFailedError::new(vec![request.channel], err);
                        self.report(err.into()).await?;
                    }
                }
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    async fn unsubscribe_batch(&self, channels: Vec<Channel>) -> Result<()> {
        match self.session.unsubscribe(&channels, &self.cancel).await {
            Ok(_) => {
                for channel in &channels {
                    self.subscriptions.remove(channel);
                }
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    /// Deliver a poll response, one batch per contiguous channel run.
    ///
    /// A sink without a registration is a routing error; the ignore
    /// predicate decides whether it is fatal.
    async fn fan_out(&self, messages: Vec<Message>) -> Result<()> {
        for (channel, batch) in group_runs(messages) {
            let sink = match self.subscriptions.get(&channel) {
                Ok(sink) => sink,
                Err(err) => {
                    self.report(err).await?;
                    continue;
                }
            };
            if channel == META_CONNECT {
                // The loop is both producer and consumer here; a blocking
                // send could wedge it, and stale advice is droppable.
                if sink.try_send(batch).is_err() {
                    warn!("connect sink full; dropping advice batch");
                }
            } else if sink.send(batch).await.is_err() {
                debug!(channel = %channel, "subscriber gone; removing sink");
                self.subscriptions.remove(&channel);
            }
        }
        Ok(())
    }

    /// Publish `error` and decide whether the loop survives it.
    async fn report(&self, error: BayeuxError) -> Result<()> {
        let ignored = self
            .ignore_error
            .as_ref()
            .map(|predicate| predicate(&error))
            .unwrap_or(false);
        if ignored {
            debug!(error = %error, "continuing past ignored error");
            let _ = self.errors.send(error).await;
            Ok(())
        } else {
            Err(error)
        }
    }
}

/// Split a poll response into contiguous per-channel runs, preserving
/// message order within each run.
///
/// Servers emit contiguous runs per channel in practice; a non-contiguous
/// sequence is data, not an error, and simply produces multiple smaller
/// batches.
fn group_runs(messages: Vec<Message>) -> Vec<(Channel, Vec<Message>)> {
    let mut runs: Vec<(Channel, Vec<Message>)> = Vec::new();
    for message in messages {
        match runs.last_mut() {
            Some((channel, batch)) if *channel == message.channel => batch.push(message),
            _ => runs.push((message.channel.clone(), vec![message])),
        }
    }
    runs
}
