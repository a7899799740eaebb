//! End-to-end client scenarios against an in-process fake server.
//!
//! The fake implements just enough Bayeux to exercise the full client
//! lifecycle: it hands out client ids, tracks subscriptions, answers every
//! `/meta/connect` with one event per subscribed channel, and can be told
//! to reject handshakes, demand a re-handshake, or hang a poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::value::RawValue;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use bayeux_tokio_http::protocol::{Advice, Channel, Message, Reconnect};
use bayeux_tokio_http::transport::{HttpTransport, TransportError, TransportResponse};
use bayeux_tokio_http::{BayeuxError, Client, ClientConfig, ConnectionState};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ServerState {
    running_client: Option<String>,
    next_client: u32,
    subs: Vec<Channel>,
    next_event: u32,
    handshakes: u32,
    reject_handshake: bool,
    demand_handshake: bool,
    hang_connect: bool,
    requests: Vec<Message>,
}

#[derive(Default)]
struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        Arc::new(FakeServer::default())
    }

    fn reject_handshake(&self) {
        self.state.lock().reject_handshake = true;
    }

    fn demand_handshake(&self) {
        self.state.lock().demand_handshake = true;
    }

    fn hang_connect(&self) {
        self.state.lock().hang_connect = true;
    }

    fn handshakes(&self) -> u32 {
        self.state.lock().handshakes
    }

    fn requests_on(&self, channel: &str) -> Vec<Message> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect()
    }

    fn advice(reconnect: Reconnect) -> Advice {
        Advice {
            reconnect: Some(reconnect),
            interval: Some(10),
            timeout: Some(30_000),
            ..Advice::default()
        }
    }

    fn answer(&self, request: &[Message]) -> Result<TransportResponse, TransportError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut replies: Vec<Message> = Vec::new();
        for message in request {
            match message.channel.as_str() {
                "/meta/handshake" => {
                    if state.reject_handshake {
                        return Ok(TransportResponse {
                            status: StatusCode::BAD_REQUEST,
                            body: Bytes::from_static(br#"{"error":"Invalid request"}"#),
                        });
                    }
                    state.handshakes += 1;
                    state.next_client += 1;
                    let client_id = format!("client-{}", state.next_client);
                    state.running_client = Some(client_id.clone());

                    let mut reply = Message::new(message.channel.clone());
                    reply.successful = Some(true);
                    reply.client_id = Some(client_id);
                    reply.version = message.version.clone();
                    reply.supported_connection_types = message.supported_connection_types.clone();
                    reply.advice = Some(Self::advice(Reconnect::Retry));
                    replies.push(reply);
                }
                "/meta/connect" => {
                    for channel in &state.subs {
                        state.next_event += 1;
                        let mut event = Message::new(channel.clone());
                        event.id = Some(format!("event-{}", state.next_event));
                        event.client_id = state.running_client.clone();
                        event.data = Some(RawValue::from_string("{}".to_string()).unwrap());
                        replies.push(event);
                    }

                    let reconnect = if state.demand_handshake {
                        state.demand_handshake = false;
                        Reconnect::Handshake
                    } else {
                        Reconnect::Retry
                    };
                    let mut reply = Message::new(message.channel.clone());
                    reply.successful = Some(true);
                    reply.client_id = state.running_client.clone();
                    reply.advice = Some(Self::advice(reconnect));
                    replies.push(reply);
                }
                "/meta/subscribe" => {
                    let subscription = message.subscription.clone().expect("subscription field");
                    let mut reply = Message::new(message.channel.clone());
                    reply.client_id = state.running_client.clone();
                    reply.subscription = Some(subscription.clone());
                    if state.subs.contains(&subscription) {
                        reply.successful = Some(false);
                        reply.error = Some(format!("403:{subscription}:already subscribed"));
                    } else {
                        state.subs.push(subscription);
                        reply.successful = Some(true);
                    }
                    replies.push(reply);
                }
                "/meta/unsubscribe" => {
                    let subscription = message.subscription.clone().expect("subscription field");
                    let mut reply = Message::new(message.channel.clone());
                    reply.client_id = state.running_client.clone();
                    reply.subscription = Some(subscription.clone());
                    if state.subs.contains(&subscription) {
                        state.subs.retain(|c| c != &subscription);
                        reply.successful = Some(true);
                    } else {
                        reply.successful = Some(false);
                        reply.error = Some(format!("403:{subscription}:not subscribed"));
                    }
                    replies.push(reply);
                }
                "/meta/disconnect" => {
                    state.subs.clear();
                    state.running_client = None;
                    let mut reply = Message::new(message.channel.clone());
                    reply.client_id = message.client_id.clone();
                    reply.successful = Some(true);
                    replies.push(reply);
                }
                other => panic!("fake server got a message on {other}"),
            }
        }

        Ok(TransportResponse {
            status: StatusCode::OK,
            body: Bytes::from(serde_json::to_vec(&replies).unwrap()),
        })
    }
}

#[async_trait]
impl HttpTransport for FakeServer {
    async fn post(
        &self,
        body: Vec<u8>,
        _timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        let request: Vec<Message> = serde_json::from_slice(&body).expect("request is JSON");
        let hang = {
            let mut state = self.state.lock();
            state.requests.extend(request.iter().cloned());
            state.hang_connect && request.iter().any(|m| m.channel == "/meta/connect")
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        self.answer(&request)
    }
}

fn client_for(server: &Arc<FakeServer>, config: ClientConfig) -> Client {
    let config = config.with_transport(server.clone());
    Client::with_config("https://example.com/cometd", config).expect("valid address")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn happy_path_delivers_events_and_disconnects_cleanly() {
    let server = FakeServer::new();
    let client = client_for(&server, ClientConfig::default());
    let mut errors = client.start(CancellationToken::new());

    let mut subscription = client.subscribe("/foo/bar").await.unwrap();
    let batch = timeout(WAIT, subscription.next())
        .await
        .expect("an event batch")
        .expect("subscription open");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].channel, "/foo/bar");
    assert!(batch[0].data.is_some());

    // The subscribe went out with the handshake-issued client id.
    let subscribes = server.requests_on("/meta/subscribe");
    assert_eq!(subscribes.len(), 1);
    assert_eq!(subscribes[0].client_id.as_deref(), Some("client-1"));
    assert_eq!(subscribes[0].subscription.as_ref().unwrap(), "/foo/bar");

    client.disconnect();
    // The engine finishes with a protocol disconnect, then closes the
    // error stream without having published anything.
    let closed = timeout(WAIT, errors.recv()).await.expect("engine stopped");
    assert!(closed.is_none());

    let disconnects = server.requests_on("/meta/disconnect");
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].client_id.as_deref(), Some("client-1"));
    assert_eq!(client.current_state(), ConnectionState::Unconnected);
}

#[tokio::test]
async fn rejected_handshake_publishes_one_wrapped_error() {
    let server = FakeServer::new();
    server.reject_handshake();
    let client = client_for(&server, ClientConfig::default());
    let mut errors = client.start(CancellationToken::new());

    let err = timeout(WAIT, errors.recv())
        .await
        .expect("an error")
        .expect("stream open");
    match err {
        BayeuxError::HandshakeFailed(failure) => match *failure.source {
            BayeuxError::BadResponse(ref bad) => {
                assert_eq!(bad.status, StatusCode::BAD_REQUEST);
                assert_eq!(bad.status_text, "Bad Request");
                assert_eq!(&bad.body[..], br#"{"error":"Invalid request"}"#);
            }
            ref other => panic!("unexpected cause: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }

    // Exactly one error, then the stream closes.
    let closed = timeout(WAIT, errors.recv()).await.expect("engine stopped");
    assert!(closed.is_none());
}

#[tokio::test]
async fn handshake_advice_renegotiates_without_losing_subscriptions() {
    let server = FakeServer::new();
    let client = client_for(&server, ClientConfig::default());
    let _errors = client.start(CancellationToken::new());

    let mut first = client.subscribe("/foo/bar").await.unwrap();
    timeout(WAIT, first.next()).await.unwrap().unwrap();

    server.demand_handshake();
    let mut second = client.subscribe("/baz/qux").await.unwrap();

    wait_until(|| server.handshakes() == 2).await;

    // Polling resumed under the new session and the queued subscribe
    // survived the renegotiation.
    let batch = timeout(WAIT, second.next())
        .await
        .expect("events after rehandshake")
        .expect("subscription open");
    assert_eq!(batch[0].channel, "/baz/qux");

    let connects = server.requests_on("/meta/connect");
    assert!(connects
        .iter()
        .any(|m| m.client_id.as_deref() == Some("client-2")));
}

#[tokio::test]
async fn double_subscribe_is_survivable_with_the_ignore_predicate() {
    let server = FakeServer::new();
    let config = ClientConfig::default()
        .with_ignore_error(|err| matches!(err, BayeuxError::SubscriptionFailed(_)));
    let client = client_for(&server, config);
    let mut errors = client.start(CancellationToken::new());

    let mut subscription = client.subscribe("/foo/bar").await.unwrap();
    timeout(WAIT, subscription.next()).await.unwrap().unwrap();

    // The duplicate is rejected but the loop keeps going.
    let _second = client.subscribe("/foo/bar").await.unwrap();
    let err = timeout(WAIT, errors.recv())
        .await
        .expect("an error")
        .expect("stream open");
    match &err {
        BayeuxError::SubscriptionFailed(failure) => {
            assert!(failure.source.to_string().contains("already subscribed"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Events still flow to the original subscriber.
    let batch = timeout(WAIT, subscription.next())
        .await
        .expect("events keep flowing")
        .expect("subscription open");
    assert_eq!(batch[0].channel, "/foo/bar");
}

#[tokio::test]
async fn unsubscribe_stops_delivery_and_ends_the_subscription() {
    let server = FakeServer::new();
    let client = client_for(&server, ClientConfig::default());
    let _errors = client.start(CancellationToken::new());

    let mut subscription = client.subscribe("/foo/bar").await.unwrap();
    timeout(WAIT, subscription.next()).await.unwrap().unwrap();

    client.unsubscribe("/foo/bar").await.unwrap();

    // The registry drops the sink once the server confirms, so the
    // subscription ends after at most a few already-delivered batches.
    let ended = timeout(WAIT, async {
        while subscription.next().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok(), "subscription never ended");

    let unsubscribes = server.requests_on("/meta/unsubscribe");
    assert_eq!(unsubscribes.len(), 1);
    assert_eq!(
        unsubscribes[0].subscription.as_ref().unwrap(),
        "/foo/bar"
    );
}

#[tokio::test]
async fn cancellation_mid_poll_surfaces_verbatim_and_stops_the_loop() {
    let server = FakeServer::new();
    server.hang_connect();
    let client = client_for(&server, ClientConfig::default());

    let cancel = CancellationToken::new();
    let mut errors = client.start(cancel.clone());

    // Give the loop time to get a poll in flight, then pull the plug.
    wait_until(|| !server.requests_on("/meta/connect").is_empty()).await;
    cancel.cancel();

    let err = timeout(WAIT, errors.recv())
        .await
        .expect("an error")
        .expect("stream open");
    match err {
        BayeuxError::ConnectionFailed(failure) => assert!(matches!(
            *failure.source,
            BayeuxError::Transport(TransportError::Cancelled)
        )),
        other => panic!("unexpected error: {other}"),
    }

    let closed = timeout(WAIT, errors.recv()).await.expect("engine stopped");
    assert!(closed.is_none());
}

#[tokio::test]
async fn pre_start_subscriptions_go_out_as_one_batch() {
    let server = FakeServer::new();
    let client = client_for(&server, ClientConfig::default());

    let mut first = client.subscribe("/foo/bar").await.unwrap();
    let mut second = client.subscribe("/baz/qux").await.unwrap();

    let _errors = client.start(CancellationToken::new());

    timeout(WAIT, first.next()).await.unwrap().unwrap();
    timeout(WAIT, second.next()).await.unwrap().unwrap();

    // Both envelopes were framed into a single subscribe request batch.
    let subscribes = server.requests_on("/meta/subscribe");
    assert_eq!(subscribes.len(), 2);
    let channels: HashMap<_, _> = subscribes
        .iter()
        .map(|m| (m.subscription.clone().unwrap(), m.client_id.clone()))
        .collect();
    assert!(channels.contains_key(&Channel::from("/foo/bar")));
    assert!(channels.contains_key(&Channel::from("/baz/qux")));
}
