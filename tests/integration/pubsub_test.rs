// tests/integration/pubsub_test.rs

//! End-to-end tests for pub/sub delivery and demultiplexing.

use super::test_helpers::TestServer;
use beryl::{Client, PushMessage};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

async fn next_message(
    subscriber: &mut (impl Stream<Item = PushMessage> + Unpin),
) -> PushMessage {
    timeout(RECV_TIMEOUT, subscriber.next())
        .await
        .expect("timed out waiting for a push message")
        .expect("subscriber stream ended unexpectedly")
}

#[tokio::test]
async fn test_subscriber_receives_published_message() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["test"]).await.unwrap();

    let receivers = publisher.publish("test", "hello").await.unwrap();
    assert_eq!(receivers, 1);

    let message = next_message(&mut subscriber).await;
    assert_eq!(message.channel, Bytes::from_static(b"test"));
    assert_eq!(message.payload, Bytes::from_static(b"hello"));
    assert!(message.pattern.is_none());
}

#[tokio::test]
async fn test_one_message_per_publish() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["feed"]).await.unwrap();

    for i in 0..10 {
        publisher
            .publish("feed", format!("event-{i}"))
            .await
            .unwrap();
    }
    for i in 0..10 {
        let message = next_message(&mut subscriber).await;
        assert_eq!(message.payload, Bytes::from(format!("event-{i}")));
    }
}

#[tokio::test]
async fn test_unrelated_channel_delivers_nothing() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["wanted"]).await.unwrap();

    assert_eq!(publisher.publish("unwanted", "noise").await.unwrap(), 0);
    publisher.publish("wanted", "signal").await.unwrap();

    // The first (and only) delivery is the message for the subscribed channel.
    let message = next_message(&mut subscriber).await;
    assert_eq!(message.channel, Bytes::from_static(b"wanted"));
    assert_eq!(message.payload, Bytes::from_static(b"signal"));
}

#[tokio::test]
async fn test_publish_counts_every_subscriber() {
    let server = TestServer::spawn().await;
    let first = Client::connect(&server.config()).await.unwrap();
    let second = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut sub_one = first.subscribe(["shared"]).await.unwrap();
    let mut sub_two = second.subscribe(["shared"]).await.unwrap();

    let receivers = publisher.publish("shared", "fanout").await.unwrap();
    assert_eq!(receivers, 2);

    // Each subscriber gets its own copy.
    assert_eq!(
        next_message(&mut sub_one).await.payload,
        Bytes::from_static(b"fanout")
    );
    assert_eq!(
        next_message(&mut sub_two).await.payload,
        Bytes::from_static(b"fanout")
    );
}

#[tokio::test]
async fn test_subscribe_to_multiple_channels_at_once() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["alpha", "beta"]).await.unwrap();

    // The extra subscribe confirmations must not disturb later replies.
    listener.ping().await.unwrap();

    publisher.publish("alpha", "one").await.unwrap();
    publisher.publish("beta", "two").await.unwrap();

    let first = next_message(&mut subscriber).await;
    let second = next_message(&mut subscriber).await;
    let mut seen = vec![
        (first.channel.clone(), first.payload.clone()),
        (second.channel.clone(), second.payload.clone()),
    ];
    seen.sort();
    assert_eq!(
        seen,
        vec![
            (Bytes::from_static(b"alpha"), Bytes::from_static(b"one")),
            (Bytes::from_static(b"beta"), Bytes::from_static(b"two")),
        ]
    );
}

#[tokio::test]
async fn test_pattern_subscription_sets_pattern_field() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.psubscribe(["news.*"]).await.unwrap();

    let receivers = publisher.publish("news.sport", "goal").await.unwrap();
    assert_eq!(receivers, 1);

    let message = next_message(&mut subscriber).await;
    assert_eq!(message.pattern, Some(Bytes::from_static(b"news.*")));
    assert_eq!(message.channel, Bytes::from_static(b"news.sport"));
    assert_eq!(message.payload, Bytes::from_static(b"goal"));
}

#[tokio::test]
async fn test_pushes_do_not_consume_reply_slots() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["busy"]).await.unwrap();

    // Interleave pushes with ordinary request/reply traffic on the
    // listening connection; replies must still line up.
    for i in 0..20 {
        publisher
            .publish("busy", format!("push-{i}"))
            .await
            .unwrap();
        assert_eq!(listener.incr("slot-counter").await.unwrap(), i + 1);
    }

    for i in 0..20 {
        let message = next_message(&mut subscriber).await;
        assert_eq!(message.payload, Bytes::from(format!("push-{i}")));
    }
}

#[tokio::test]
async fn test_unsubscribe_ends_the_stream() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();
    let publisher = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["short-lived"]).await.unwrap();
    publisher.publish("short-lived", "before").await.unwrap();
    assert_eq!(
        next_message(&mut subscriber).await.payload,
        Bytes::from_static(b"before")
    );

    listener
        .connection()
        .unsubscribe(["short-lived"])
        .await
        .unwrap();

    // The registry entry is gone; the stream terminates without an error.
    let end = timeout(RECV_TIMEOUT, subscriber.next())
        .await
        .expect("stream did not terminate after unsubscribe");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_subscribe_after_close_fails() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();

    listener.close().await;
    // Give the connection task time to tear down its registry.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(listener.subscribe(["late"]).await.is_err());
}

#[tokio::test]
async fn test_connection_close_terminates_subscribers() {
    let server = TestServer::spawn().await;
    let listener = Client::connect(&server.config()).await.unwrap();

    let mut subscriber = listener.subscribe(["doomed"]).await.unwrap();
    listener.close().await;

    let end = timeout(RECV_TIMEOUT, subscriber.next())
        .await
        .expect("stream did not terminate after close");
    assert!(end.is_none());
}
