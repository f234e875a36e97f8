use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;

use super::{Broker, BrokerHandle, Delivery, Message, SubscriberQueue, Subscription};
use crate::config::{BrokerSettings, OverflowPolicy};
use crate::utils::HubError;

fn settings(queue_capacity: usize, overflow: OverflowPolicy) -> BrokerSettings {
    BrokerSettings {
        queue_capacity,
        overflow,
        ..BrokerSettings::default()
    }
}

fn msg(content: &str) -> Arc<Message> {
    Arc::new(Message::new(content, "tester"))
}

async fn next_content(subscription: &mut Subscription) -> String {
    match tokio::time::timeout(Duration::from_secs(2), subscription.recv()).await {
        Ok(Delivery::Message(message)) => message.content.clone(),
        other => panic!("Expected a message, got {other:?}"),
    }
}

/// Drain until the queue closes, returning every content received.
async fn drain(subscription: &mut Subscription) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), subscription.recv()).await {
            Ok(Delivery::Message(message)) => seen.push(message.content.clone()),
            Ok(Delivery::Closed) => return seen,
            other => panic!("Unexpected delivery {other:?}"),
        }
    }
}

#[test]
fn test_broker_new() {
    let broker = Broker::default();
    assert_eq!(broker.name(), "main");
    assert_eq!(broker.subscriber_count(), 0);
}

#[test]
fn test_broker_register_and_unregister() {
    let mut broker = Broker::default();
    let (queue, _rx) = SubscriberQueue::new(4);
    let id = queue.id().clone();

    broker.register(queue).unwrap();
    assert!(broker.subscribers.contains_key(&id));

    broker.unregister(&id);
    assert!(!broker.subscribers.contains_key(&id));
}

#[test]
fn test_unregister_unknown_is_noop() {
    let mut broker = Broker::default();
    let (queue, _rx) = SubscriberQueue::new(4);
    let id = queue.id().clone();
    broker.register(queue).unwrap();

    broker.unregister(&"nobody".to_string());
    assert_eq!(broker.subscriber_count(), 1);

    broker.unregister(&id);
    broker.unregister(&id);
    assert_eq!(broker.subscriber_count(), 0);
}

#[test]
fn test_queue_ids_are_unique() {
    let (a, _rx_a) = SubscriberQueue::new(1);
    let (b, _rx_b) = SubscriberQueue::new(1);
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_broker_publish() {
    let mut broker = Broker::default();
    let (queue, mut rx) = SubscriberQueue::new(4);
    broker.register(queue).unwrap();

    broker.publish(msg("hello"));

    let received = rx.try_recv().unwrap();
    assert_eq!(received.content, "hello");
    assert_eq!(received.author, "tester");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_publish_without_subscribers() {
    let mut broker = Broker::default();
    broker.publish(msg("nobody listens"));
    // No assertion, just checking for no panics.
}

#[test]
fn test_publish_to_subscriber_with_dropped_receiver() {
    let mut broker = Broker::default();
    let (queue, rx) = SubscriberQueue::new(4);
    broker.register(queue).unwrap();

    // Drop the receiver to close the queue from the session side
    drop(rx);

    broker.publish(msg("hello"));
    assert_eq!(broker.subscriber_count(), 1);
}

#[test]
fn test_register_beyond_limit_fails() {
    let mut broker = Broker::new(BrokerSettings {
        max_subscribers: 1,
        ..BrokerSettings::default()
    });
    let (first, _rx1) = SubscriberQueue::new(4);
    let (second, _rx2) = SubscriberQueue::new(4);

    broker.register(first).unwrap();
    let err = broker.register(second).unwrap_err();
    assert!(matches!(err, HubError::SubscriberLimit { limit: 1 }));
    assert_eq!(broker.subscriber_count(), 1);
}

#[test]
fn test_drop_oldest_keeps_latest_messages() {
    let mut broker = Broker::new(settings(2, OverflowPolicy::DropOldest));
    let (queue, mut rx) = SubscriberQueue::new(2);
    broker.register(queue).unwrap();

    broker.publish(msg("1"));
    broker.publish(msg("2"));
    broker.publish(msg("3"));

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
    assert_eq!(rx.try_recv().unwrap().content, "2");
    assert_eq!(rx.try_recv().unwrap().content, "3");
    assert_eq!(broker.subscriber_count(), 1);
}

#[test]
fn test_disconnect_policy_evicts_full_queue() {
    let mut broker = Broker::new(settings(2, OverflowPolicy::Disconnect));
    let (slow, mut slow_rx) = SubscriberQueue::new(2);
    let (fast, mut fast_rx) = SubscriberQueue::new(2);
    let fast_id = fast.id().clone();
    broker.register(slow).unwrap();
    broker.register(fast).unwrap();

    broker.publish(msg("1"));
    broker.publish(msg("2"));
    assert_eq!(fast_rx.try_recv().unwrap().content, "1");
    assert_eq!(fast_rx.try_recv().unwrap().content, "2");

    broker.publish(msg("3"));

    assert_eq!(broker.subscriber_count(), 1);
    assert!(broker.subscribers.contains_key(&fast_id));
    assert_eq!(fast_rx.try_recv().unwrap().content, "3");

    assert_eq!(slow_rx.try_recv().unwrap().content, "1");
    assert_eq!(slow_rx.try_recv().unwrap().content, "2");
    assert!(matches!(slow_rx.try_recv(), Err(TryRecvError::Closed)));
}

#[test]
fn test_shutdown_closes_queues_after_drain() {
    let mut broker = Broker::default();
    let (queue, mut rx) = SubscriberQueue::new(4);
    broker.register(queue).unwrap();

    broker.publish(msg("last"));
    broker.shutdown();

    assert_eq!(broker.subscriber_count(), 0);
    assert_eq!(rx.try_recv().unwrap().content, "last");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
}

#[tokio::test]
async fn test_handle_reports_name() {
    let (handle, _task) = Broker::start(BrokerSettings {
        name: "side".to_string(),
        ..BrokerSettings::default()
    });
    assert_eq!(handle.name(), "side");
}

#[tokio::test]
async fn test_late_subscriber_gets_no_backlog() {
    let (handle, _task) = Broker::start(BrokerSettings::default());

    handle.publish(Message::new("a", "u")).unwrap();
    let mut late = handle.register().await.unwrap();
    handle.publish(Message::new("b", "u")).unwrap();

    assert_eq!(next_content(&mut late).await, "b");
    handle.shutdown();
    assert_eq!(drain(&mut late).await, Vec::<String>::new());
}

#[tokio::test]
async fn test_every_subscriber_receives_message_once() {
    let (handle, _task) = Broker::start(BrokerSettings::default());
    let mut s1 = handle.register().await.unwrap();
    let mut s2 = handle.register().await.unwrap();

    handle.publish(Message::new("x", "u")).unwrap();
    handle.shutdown();

    for subscription in [&mut s1, &mut s2] {
        match subscription.recv().await {
            Delivery::Message(message) => {
                assert_eq!(message.content, "x");
                assert_eq!(message.author, "u");
            }
            other => panic!("Expected a message, got {other:?}"),
        }
        assert_eq!(subscription.recv().await, Delivery::Closed);
    }
}

#[tokio::test]
async fn test_subscribers_observe_global_publish_order() {
    let (handle, _task) = Broker::start(settings(1024, OverflowPolicy::DropOldest));
    let mut s1 = handle.register().await.unwrap();
    let mut s2 = handle.register().await.unwrap();

    let mut publishers = Vec::new();
    for p in 0..4 {
        let handle = handle.clone();
        publishers.push(tokio::spawn(async move {
            for n in 0..50 {
                handle.publish(Message::new(format!("{p}-{n}"), "u")).unwrap();
                if n % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }
    handle.shutdown();

    let seen1 = drain(&mut s1).await;
    let seen2 = drain(&mut s2).await;
    assert_eq!(seen1.len(), 200);
    assert_eq!(seen1, seen2);

    // Each publisher's own messages keep their relative order.
    for p in 0..4 {
        let prefix = format!("{p}-");
        let ours: Vec<u32> = seen1
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(ours, (0..50).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_concurrent_registration_sees_contiguous_suffix() {
    let (handle, _task) = Broker::start(settings(1024, OverflowPolicy::DropOldest));

    let publisher = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for n in 0..200 {
                handle.publish(Message::new(n.to_string(), "u")).unwrap();
                if n % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut subscriptions = Vec::new();
    for _ in 0..5 {
        subscriptions.push(handle.register().await.unwrap());
        tokio::task::yield_now().await;
    }
    publisher.await.unwrap();
    handle.shutdown();

    for subscription in &mut subscriptions {
        let seen: Vec<u32> = drain(subscription)
            .await
            .iter()
            .map(|c| c.parse().unwrap())
            .collect();
        if let Some(first) = seen.first() {
            let expected: Vec<u32> = (*first..200).collect();
            assert_eq!(seen, expected);
        }
    }
}

#[tokio::test]
async fn test_dropping_subscription_unregisters() {
    let (handle, _task) = Broker::start(BrokerSettings::default());
    let subscription = handle.register().await.unwrap();
    assert_eq!(handle.subscriber_count().await.unwrap(), 1);

    drop(subscription);
    assert_eq!(handle.subscriber_count().await.unwrap(), 0);

    handle.unregister(&"already-gone".to_string());
    assert_eq!(handle.subscriber_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_register_over_limit_through_handle() {
    let (handle, _task) = Broker::start(BrokerSettings {
        max_subscribers: 1,
        ..BrokerSettings::default()
    });
    let _first = handle.register().await.unwrap();
    let err = handle.register().await.unwrap_err();
    assert!(matches!(err, HubError::SubscriberLimit { limit: 1 }));
    assert_eq!(handle.subscriber_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_operations_after_shutdown() {
    let (handle, task) = Broker::start(BrokerSettings::default());
    let mut subscription = handle.register().await.unwrap();

    handle.publish(Message::new("before", "u")).unwrap();
    handle.shutdown();
    task.await.unwrap();

    assert!(handle.is_closed());
    assert_eq!(drain(&mut subscription).await, vec!["before".to_string()]);
    assert!(matches!(
        handle.publish(Message::new("after", "u")),
        Err(HubError::BrokerClosed)
    ));
    assert!(matches!(handle.register().await, Err(HubError::BrokerClosed)));
    assert!(matches!(
        handle.subscriber_count().await,
        Err(HubError::BrokerClosed)
    ));
    // Still a no-op once the loop has stopped.
    handle.unregister(subscription.id());
}

#[tokio::test]
async fn test_handle_is_cloneable_across_tasks() {
    let (handle, _task) = Broker::start(BrokerSettings::default());
    let mut subscription = handle.register().await.unwrap();

    let remote: BrokerHandle = handle.clone();
    tokio::spawn(async move {
        remote.publish(Message::new("from task", "u")).unwrap();
    })
    .await
    .unwrap();

    assert_eq!(next_content(&mut subscription).await, "from task");
}

#[tokio::test]
async fn test_drop_oldest_honours_non_power_of_two_capacity() {
    let (handle, _task) = Broker::start(settings(3, OverflowPolicy::DropOldest));
    let mut subscription = handle.register().await.unwrap();

    for n in 0..10 {
        handle.publish(Message::new(n.to_string(), "u")).unwrap();
    }
    handle.shutdown();

    assert_eq!(subscription.recv().await, Delivery::Skipped(7));
    for expected in ["7", "8", "9"] {
        assert_eq!(next_content(&mut subscription).await, expected);
    }
    assert_eq!(subscription.recv().await, Delivery::Closed);
}

#[tokio::test]
async fn test_overflow_below_channel_rounding_is_still_trimmed() {
    // Capacity 5 sits in an 8-slot channel; six messages never lag the
    // channel itself but still exceed the configured bound.
    let (handle, _task) = Broker::start(settings(5, OverflowPolicy::DropOldest));
    let mut subscription = handle.register().await.unwrap();

    for n in 0..6 {
        handle.publish(Message::new(n.to_string(), "u")).unwrap();
    }
    handle.shutdown();

    assert_eq!(subscription.recv().await, Delivery::Skipped(1));
    assert_eq!(
        drain(&mut subscription).await,
        vec!["1", "2", "3", "4", "5"]
    );
}
