//! Upstream link lifecycle against a mock feed.

use std::time::Duration;

use ais_relay::relay::LinkState;
use ais_relay::resilience::ReconnectPolicy;
use serde_json::json;

mod common;

use common::{parse, spawn_link, unused_addr, wait_until, MockFeed, TEST_API_KEY};

fn quick_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy::exponential(Duration::from_millis(20), Duration::from_millis(80), max_attempts)
}

#[tokio::test]
async fn test_subscription_sent_on_open() {
    let feed = MockFeed::start().await;
    let (broadcaster, link) = spawn_link(feed.url(), quick_policy(3));

    link.connect().await;
    let session = feed.next_session().await;

    assert_eq!(
        parse(&session.subscription),
        json!({
            "APIKey": TEST_API_KEY,
            "BoundingBoxes": [[[51.0, -11.0], [56.0, -5.0]]],
            "FilterMessageTypes": ["PositionReport"]
        })
    );
    assert!(wait_until(Duration::from_secs(2), || broadcaster.state().upstream_connected()).await);
    assert_eq!(link.reconnect_attempts(), 0);

    link.stop().await;
}

#[tokio::test]
async fn test_messages_forwarded_in_order() {
    let feed = MockFeed::start().await;
    let (broadcaster, link) = spawn_link(feed.url(), quick_policy(3));
    let mut subscriber = broadcaster.register(None);

    let greeting = parse(subscriber.frames.recv().await.unwrap().as_str());
    assert_eq!(greeting["status"], "disconnected");

    link.connect().await;
    let session = feed.next_session().await;

    let connected = parse(subscriber.frames.recv().await.unwrap().as_str());
    assert_eq!(connected, json!({"type": "status", "status": "connected", "message": "Connected to AISStream"}));

    for i in 0..50 {
        session.send(format!(r#"{{"MessageType":"PositionReport","Seq":{i}}}"#));
    }
    for i in 0..50 {
        let event = parse(subscriber.frames.recv().await.unwrap().as_str());
        assert_eq!(event["type"], "ais-data");
        assert_eq!(parse(event["data"].as_str().unwrap())["Seq"], i);
    }
    assert_eq!(broadcaster.state().message_count(), 50);

    link.stop().await;
}

#[tokio::test]
async fn test_messages_counted_without_subscribers() {
    let feed = MockFeed::start().await;
    let (broadcaster, link) = spawn_link(feed.url(), quick_policy(3));

    link.connect().await;
    let session = feed.next_session().await;
    for i in 0..1000 {
        session.send(i.to_string());
    }

    assert!(wait_until(Duration::from_secs(5), || broadcaster.state().message_count() == 1000).await);
    assert_eq!(broadcaster.subscriber_count(), 0);

    link.stop().await;
}

#[tokio::test]
async fn test_reconnects_after_feed_closes() {
    let feed = MockFeed::start().await;
    let (broadcaster, link) = spawn_link(feed.url(), quick_policy(5));
    let mut subscriber = broadcaster.register(None);
    subscriber.frames.recv().await.unwrap();

    link.connect().await;
    let first = feed.next_session().await;
    assert_eq!(parse(subscriber.frames.recv().await.unwrap().as_str())["status"], "connected");

    first.close();
    assert_eq!(parse(subscriber.frames.recv().await.unwrap().as_str())["status"], "disconnected");

    let _second = feed.next_session().await;
    assert_eq!(parse(subscriber.frames.recv().await.unwrap().as_str())["status"], "connected");
    assert_eq!(feed.accepted(), 2);
    assert!(wait_until(Duration::from_secs(2), || link.reconnect_attempts() == 0).await);

    link.stop().await;
}

#[tokio::test]
async fn test_feed_close_is_answered_before_reconnect() {
    let feed = MockFeed::start().await;
    let (_broadcaster, link) = spawn_link(feed.url(), quick_policy(3));

    link.connect().await;
    let mut session = feed.next_session().await;
    assert!(wait_until(Duration::from_secs(2), || link.state() == LinkState::Connected).await);

    assert!(session.close_acknowledged().await);
    let _second = feed.next_session().await;
    assert_eq!(feed.accepted(), 2);

    link.stop().await;
}

#[tokio::test]
async fn test_unreachable_feed_exhausts_then_manual_connect_recovers() {
    let feed = MockFeed::start().await;
    feed.set_accepting(false);
    let (broadcaster, link) = spawn_link(feed.url(), quick_policy(3));

    link.connect().await;
    assert!(wait_until(Duration::from_secs(5), || link.state() == LinkState::Exhausted).await);
    assert_eq!(link.reconnect_attempts(), 3);
    // The first attempt plus three scheduled reconnects.
    assert_eq!(feed.accepted(), 4);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(feed.accepted(), 4);
    assert_eq!(broadcaster.state().snapshot(0).status, "exhausted");

    feed.set_accepting(true);
    link.connect().await;
    let _session = feed.next_session().await;
    assert!(wait_until(Duration::from_secs(2), || link.state() == LinkState::Connected).await);
    assert_eq!(link.reconnect_attempts(), 0);

    link.stop().await;
}

#[tokio::test]
async fn test_connect_failure_schedules_reconnect() {
    let addr = unused_addr().await;
    let (broadcaster, link) = spawn_link(format!("ws://{}", addr), quick_policy(2));
    let mut subscriber = broadcaster.register(None);
    subscriber.frames.recv().await.unwrap();

    link.connect().await;
    assert_eq!(parse(subscriber.frames.recv().await.unwrap().as_str())["status"], "error");
    assert_eq!(parse(subscriber.frames.recv().await.unwrap().as_str())["status"], "disconnected");
    assert!(wait_until(Duration::from_secs(5), || link.state() == LinkState::Exhausted).await);

    link.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_pending_reconnect() {
    let feed = MockFeed::start().await;
    let (_broadcaster, link) =
        spawn_link(feed.url(), ReconnectPolicy::fixed(Duration::from_millis(300)));

    link.connect().await;
    let session = feed.next_session().await;
    session.close();
    assert!(wait_until(Duration::from_secs(2), || link.state() == LinkState::ReconnectScheduled).await);

    link.stop().await;
    assert_eq!(link.state(), LinkState::Stopped);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(feed.accepted(), 1);
}

#[tokio::test]
async fn test_stop_closes_connection_normally() {
    let feed = MockFeed::start().await;
    let (_broadcaster, link) = spawn_link(feed.url(), quick_policy(3));

    link.connect().await;
    let mut session = feed.next_session().await;
    assert!(wait_until(Duration::from_secs(2), || link.state() == LinkState::Connected).await);

    link.stop().await;
    assert_eq!(session.closed_by_relay().await, Some(1000));

    // Idempotent, and connect after stop is ignored.
    link.stop().await;
    link.connect().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(feed.accepted(), 1);
    assert_eq!(link.state(), LinkState::Stopped);
}
