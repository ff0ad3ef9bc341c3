//! Integration tests for chat sessions against the in-memory broker

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use amqchat_core::broker::memory::MemoryBroker;
use amqchat_core::broker::{BrokerConnector, Envelope, FANOUT_ROUTING_KEY};
use amqchat_core::{ChatConfig, ChatError, ChatSession};

const RECV_TIMEOUT: Duration = Duration::from_millis(500);
const SILENCE_TIMEOUT: Duration = Duration::from_millis(100);

fn config(room: &str, participant: &str) -> ChatConfig {
    ChatConfig::new("local", room, participant)
}

async fn open_listening(
    broker: &MemoryBroker,
    room: &str,
    participant: &str,
) -> (ChatSession, mpsc::UnboundedReceiver<String>) {
    let mut session = ChatSession::open(broker, &config(room, participant))
        .await
        .expect("session open");
    let (tx, rx) = mpsc::unbounded_channel();
    session.start_receiving(tx).await.expect("start receiving");
    (session, rx)
}

#[tokio::test]
async fn own_messages_are_never_surfaced() {
    let broker = MemoryBroker::new();
    let (session, mut rx) = open_listening(&broker, "lobby", "alice").await;

    session.send("talking to myself").await.unwrap();

    // The broker echoes every publish back to the publisher's queue;
    // the session must drop it before it reaches the output.
    assert!(timeout(SILENCE_TIMEOUT, rx.recv()).await.is_err());
    session.close().await;
}

#[tokio::test]
async fn messages_reach_other_sessions_exactly_once() {
    let broker = MemoryBroker::new();
    let (alice, mut alice_rx) = open_listening(&broker, "lobby", "alice").await;
    let (bob, mut bob_rx) = open_listening(&broker, "lobby", "bob").await;

    alice.send("hello bob").await.unwrap();

    let line = timeout(RECV_TIMEOUT, bob_rx.recv())
        .await
        .expect("delivery within timeout")
        .expect("stream still open");
    assert_eq!(line, "alice: hello bob");

    // Exactly once for bob, zero times for alice herself.
    assert!(timeout(SILENCE_TIMEOUT, bob_rx.recv()).await.is_err());
    assert!(timeout(SILENCE_TIMEOUT, alice_rx.recv()).await.is_err());

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn opening_the_same_room_twice_succeeds() {
    let broker = MemoryBroker::new();
    let first = ChatSession::open(&broker, &config("lobby", "alice"))
        .await
        .expect("first open");
    let second = ChatSession::open(&broker, &config("lobby", "bob"))
        .await
        .expect("second open declares the existing exchange");
    first.close().await;
    second.close().await;
}

#[tokio::test]
async fn sessions_get_distinct_sender_tokens() {
    let broker = MemoryBroker::new();
    let first = ChatSession::open(&broker, &config("lobby", "alice"))
        .await
        .unwrap();
    let second = ChatSession::open(&broker, &config("lobby", "alice"))
        .await
        .unwrap();
    assert_ne!(first.sender_id(), second.sender_id());
    first.close().await;
    second.close().await;
}

#[tokio::test]
async fn delivery_without_sender_token_is_surfaced() {
    let broker = MemoryBroker::new();
    let (session, mut rx) = open_listening(&broker, "lobby", "alice").await;

    // A foreign publisher that attaches no metadata at all.
    let connection = broker.connect("local").await.unwrap();
    let channel = connection.open_channel().await.unwrap();
    channel
        .publish(
            "lobby",
            FANOUT_ROUTING_KEY,
            Envelope {
                body: b"ghost: hi".to_vec(),
                sender_id: None,
            },
        )
        .await
        .unwrap();

    let line = timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("delivery within timeout")
        .expect("stream still open");
    assert_eq!(line, "ghost: hi");
    session.close().await;
}

#[tokio::test]
async fn close_is_safe_after_the_connection_dropped() {
    let broker = MemoryBroker::new();
    let (session, _rx) = open_listening(&broker, "lobby", "alice").await;

    // Drop the link out from under the session, then close it anyway.
    broker.sever();
    session.close().await;

    // The failed close must not prevent the next attempt.
    broker.restore();
    let retry = ChatSession::open(&broker, &config("lobby", "alice"))
        .await
        .expect("reconnect after failed close");
    retry.close().await;
}

#[tokio::test]
async fn empty_names_fail_before_any_connection_attempt() {
    let broker = MemoryBroker::new();

    let err = ChatSession::open(&broker, &config("", "alice"))
        .await
        .expect_err("empty room is rejected");
    assert!(matches!(err, ChatError::Configuration { .. }));
    assert!(!err.is_recoverable());

    let err = ChatSession::open(&broker, &config("lobby", ""))
        .await
        .expect_err("empty participant is rejected");
    assert!(matches!(err, ChatError::Configuration { .. }));

    assert_eq!(broker.connect_attempts(), 0);
}

#[tokio::test]
async fn send_fails_once_the_link_is_gone() {
    let broker = MemoryBroker::new();
    let (session, _rx) = open_listening(&broker, "lobby", "alice").await;

    broker.sever();
    let err = session.send("anyone there?").await.expect_err("dead link");
    assert!(matches!(err, ChatError::Send(_)));
    assert!(err.is_recoverable());
    session.close().await;
}
