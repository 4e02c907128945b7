use super::*;
use crate::events::{EventOptions, Topic};
use crate::test_utils::{wait_until, CountingHandler};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn make_event(topic: Topic) -> Arc<RevocationEvent> {
    Arc::new(RevocationEvent::new(
        topic,
        "default",
        json!({}),
        EventOptions::fresh(),
    ))
}

#[tokio::test]
async fn test_channel_publish_no_receivers() {
    let bus = ChannelEventBus::new();

    // Should not error even with no receivers
    let result = bus.publish(make_event(Topic::RevListFinished)).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_channel_subscribe_and_receive() {
    let bus = ChannelEventBus::new();

    let handler = Arc::new(CountingHandler::new());
    let count = handler.count();
    bus.subscribe(TopicFilter::All, handler).await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(make_event(Topic::RevRegDefCreateRequested))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || count.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_channel_topic_filter() {
    let bus = ChannelEventBus::new();

    let handler = Arc::new(CountingHandler::new());
    let count = handler.count();
    bus.subscribe(
        TopicFilter::topics([Topic::RevListStoreRequested]),
        handler,
    )
    .await
    .unwrap();

    let all = Arc::new(CountingHandler::new());
    let all_count = all.count();
    bus.subscribe(TopicFilter::All, all).await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(make_event(Topic::RevListStoreRequested))
        .await
        .unwrap();
    bus.publish(make_event(Topic::RevRegDefCreateRequested))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || all_count.load(Ordering::SeqCst) == 2).await);
    // Should only count the matching one
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_start_consuming_is_idempotent() {
    let bus = ChannelEventBus::new();

    let handler = Arc::new(CountingHandler::new());
    let count = handler.count();
    bus.subscribe(TopicFilter::All, handler).await.unwrap();
    bus.start_consuming().await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(make_event(Topic::RevListFinished)).await.unwrap();

    assert!(wait_until(Duration::from_secs(1), || count.load(Ordering::SeqCst) >= 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_failure_does_not_stop_consumer() {
    let bus = ChannelEventBus::new();

    let failing = Arc::new(CountingHandler::failing());
    let failures = failing.count();
    bus.subscribe(TopicFilter::All, failing).await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(make_event(Topic::RevListFinished)).await.unwrap();
    bus.publish(make_event(Topic::RevListFinished)).await.unwrap();

    assert!(wait_until(Duration::from_secs(1), || failures.load(Ordering::SeqCst) == 2).await);
}
