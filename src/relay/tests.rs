use super::{Broadcaster, ChannelRegistry, Offer, Payload, Subscriber};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tungstenite::protocol::Message as WsMessage;

fn text(s: &str) -> Payload {
    Payload::Text(s.to_string())
}

#[test]
fn test_registry_subscribe_and_unsubscribe() {
    let registry = ChannelRegistry::new();
    let (handle, _outbox) = Subscriber::new("general", 4);

    registry.subscribe("general", handle.clone());
    assert!(registry.contains("general", handle.id()));
    assert_eq!(registry.subscriber_count("general"), 1);

    registry.unsubscribe("general", &handle);
    assert!(!registry.contains("general", handle.id()));
}

#[test]
fn test_registry_subscribe_is_idempotent() {
    let registry = ChannelRegistry::new();
    let (handle, _outbox) = Subscriber::new("general", 4);

    registry.subscribe("general", handle.clone());
    registry.subscribe("general", handle.clone());
    assert_eq!(registry.subscriber_count("general"), 1);
    assert_eq!(registry.subscribers_of("general").len(), 1);
}

#[test]
fn test_registry_prunes_empty_channels() {
    let registry = ChannelRegistry::new();
    for _ in 0..50 {
        let (handle, _outbox) = Subscriber::new("churn", 4);
        registry.subscribe("churn", handle.clone());
        registry.unsubscribe("churn", &handle);
    }
    assert_eq!(registry.channel_count(), 0);
}

#[test]
fn test_registry_unsubscribe_unknown_is_noop() {
    let registry = ChannelRegistry::new();
    let (handle, _outbox) = Subscriber::new("general", 4);

    registry.unsubscribe("general", &handle);
    registry.unsubscribe("nowhere", &handle);
    assert_eq!(registry.channel_count(), 0);
}

#[test]
fn test_registry_handle_lives_in_one_channel() {
    let registry = ChannelRegistry::new();
    let (handle, _outbox) = Subscriber::new("a", 4);

    registry.subscribe("a", handle.clone());
    registry.subscribe("b", handle.clone());

    assert!(!registry.contains("a", handle.id()));
    assert!(registry.contains("b", handle.id()));
    assert_eq!(registry.channel_count(), 1);
}

#[test]
fn test_registry_snapshot_is_not_live() {
    let registry = ChannelRegistry::new();
    let (first, _o1) = Subscriber::new("general", 4);
    let (second, _o2) = Subscriber::new("general", 4);
    registry.subscribe("general", first.clone());

    let snapshot = registry.subscribers_of("general");
    registry.subscribe("general", second.clone());
    registry.unsubscribe("general", &first);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id(), first.id());
}

#[test]
fn test_subscriber_offer_full_and_closed() {
    let (handle, mut outbox) = Subscriber::new("general", 1);
    let message = Arc::new(super::Message::new("general", text("a")));

    assert_eq!(handle.offer(message.clone()), Offer::Queued);
    assert_eq!(handle.offer(message.clone()), Offer::Full);
    assert_eq!(outbox.len(), 1);

    assert!(handle.close());
    assert!(!handle.close());
    assert!(!handle.is_alive());
    assert_eq!(handle.offer(message), Offer::Closed);

    // what was queued before close still drains, then end-of-stream
    assert!(outbox.try_recv().is_some());
    assert!(outbox.try_recv().is_none());
}

#[test]
fn test_payload_frames_keep_their_kind() {
    assert_eq!(
        Payload::from_frame(WsMessage::text("hi".to_string())),
        Some(text("hi"))
    );
    assert_eq!(
        Payload::from_frame(WsMessage::binary(vec![0u8, 159, 146, 150])),
        Some(Payload::Binary(vec![0, 159, 146, 150]))
    );
    assert_eq!(Payload::from_frame(WsMessage::Ping(Default::default())), None);
    assert_eq!(Payload::from_frame(WsMessage::Close(None)), None);

    let message = super::Message::new("bin", Payload::Binary(vec![1, 2, 3]));
    assert!(message.to_frame().is_binary());
    assert_eq!(message.to_frame().into_data().to_vec(), vec![1, 2, 3]);
}

#[test]
fn test_publish_reaches_every_subscriber_once() {
    let broadcaster = Broadcaster::new(8);
    let (_a, mut outbox_a) = broadcaster.join("general");
    let (_b, mut outbox_b) = broadcaster.join("general");
    let (_c, mut outbox_other) = broadcaster.join("random");

    let delivered = broadcaster.publish("general", text("hello"));
    assert_eq!(delivered, 2);

    for outbox in [&mut outbox_a, &mut outbox_b] {
        let msg = outbox.try_recv().expect("message delivered");
        assert_eq!(msg.channel, "general");
        assert_eq!(msg.payload, text("hello"));
        assert!(outbox.try_recv().is_none());
    }
    assert!(outbox_other.try_recv().is_none());
}

#[test]
fn test_publish_preserves_order_per_subscriber() {
    let broadcaster = Broadcaster::new(64);
    let (_a, mut outbox) = broadcaster.join("ordered");

    for i in 0..20 {
        broadcaster.publish("ordered", text(&i.to_string()));
    }

    let received: Vec<Payload> = std::iter::from_fn(|| outbox.try_recv())
        .map(|m| m.payload.clone())
        .collect();
    let expected: Vec<Payload> = (0..20).map(|i| text(&i.to_string())).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_publish_to_nonexistent_channel() {
    let broadcaster = Broadcaster::default();
    assert_eq!(broadcaster.publish("empty", text("hello")), 0);
    assert_eq!(broadcaster.channel_count(), 0);
}

#[test]
fn test_saturated_subscriber_does_not_block_others() {
    let broadcaster = Broadcaster::new(2);
    let (slow, _slow_outbox) = broadcaster.join("y");
    let (_fast, mut fast_outbox) = broadcaster.join("y");

    for i in 0..10 {
        broadcaster.publish("y", text(&format!("m{i}")));
        assert!(fast_outbox.try_recv().is_some(), "fast client missed m{i}");
    }

    // the slow one was evicted on the third publish
    assert!(!slow.is_alive());
    assert!(!broadcaster.registry().contains("y", slow.id()));
    assert_eq!(broadcaster.subscriber_count("y"), 1);
}

#[test]
fn test_leave_stops_delivery() {
    let broadcaster = Broadcaster::new(8);
    let (handle, mut outbox) = broadcaster.join("x");

    broadcaster.leave(&handle);
    assert_eq!(broadcaster.publish("x", text("late")), 0);
    assert!(!broadcaster.registry().contains("x", handle.id()));
    assert!(outbox.try_recv().is_none());
}

#[test]
fn test_snapshot_taken_before_leave_does_not_deliver() {
    let broadcaster = Broadcaster::new(8);
    let (handle, mut outbox) = broadcaster.join("x");

    let snapshot = broadcaster.registry().subscribers_of("x");
    broadcaster.leave(&handle);

    let message = Arc::new(super::Message::new("x", text("stale")));
    assert_eq!(snapshot[0].offer(message), Offer::Closed);
    assert!(outbox.try_recv().is_none());
}

#[test]
fn test_leave_twice_is_same_as_once() {
    let broadcaster = Broadcaster::new(8);
    let (handle, _outbox) = broadcaster.join("x");
    let (_other, _other_outbox) = broadcaster.join("x");

    broadcaster.leave(&handle);
    broadcaster.leave(&handle);

    assert_eq!(broadcaster.subscriber_count("x"), 1);
    assert!(!handle.is_alive());
}

#[test]
fn test_closed_outbox_is_pruned_on_publish() {
    let broadcaster = Broadcaster::new(8);
    let (handle, outbox) = broadcaster.join("x");
    drop(outbox);

    assert_eq!(broadcaster.publish("x", text("hello")), 0);
    assert!(!handle.is_alive());
    assert_eq!(broadcaster.channel_count(), 0);
}

#[derive(Serialize)]
struct UserCreated<'a> {
    event: &'a str,
    email: &'a str,
}

#[test]
fn test_publish_event_sends_json_text() {
    let broadcaster = Broadcaster::new(8);
    let (_handle, mut outbox) = broadcaster.join("system");

    let delivered = broadcaster
        .publish_event(
            "system",
            &UserCreated {
                event: "user_created",
                email: "alice@example.com",
            },
        )
        .unwrap();
    assert_eq!(delivered, 1);

    let msg = outbox.try_recv().unwrap();
    let Payload::Text(body) = &msg.payload else {
        panic!("Expected a text payload");
    };
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(value["event"], "user_created");
    assert_eq!(value["email"], "alice@example.com");
}

#[tokio::test]
async fn test_closed_wakes_waiter() {
    let (handle, _outbox) = Subscriber::new("x", 4);
    let waiter = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.closed().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.close();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("closed() did not resolve")
        .unwrap();

    // already closed: resolves immediately
    tokio::time::timeout(Duration::from_millis(100), handle.closed())
        .await
        .expect("closed() should be immediate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_publish_leave_stress() {
    const CHANNELS: usize = 5;
    const CONNECTIONS: usize = 120;
    const MESSAGES: usize = 20;

    let broadcaster = Arc::new(Broadcaster::new(CONNECTIONS * MESSAGES));

    // stable listeners, one per channel, that observe every publish
    let mut listeners = Vec::new();
    for c in 0..CHANNELS {
        listeners.push(broadcaster.join(&format!("chan-{c}")));
    }

    let mut tasks = Vec::new();
    for n in 0..CONNECTIONS {
        let broadcaster = broadcaster.clone();
        tasks.push(tokio::spawn(async move {
            let channel = format!("chan-{}", n % CHANNELS);
            let (handle, _outbox) = broadcaster.join(&channel);
            for m in 0..MESSAGES {
                broadcaster.publish(&channel, Payload::Text(format!("{n}:{m}")));
                tokio::task::yield_now().await;
            }
            broadcaster.leave(&handle);
            broadcaster.leave(&handle);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // only the listeners remain
    assert_eq!(broadcaster.channel_count(), CHANNELS);
    for (c, (handle, outbox)) in listeners.iter_mut().enumerate() {
        let channel = format!("chan-{c}");
        assert_eq!(broadcaster.subscriber_count(&channel), 1);
        assert!(handle.is_alive());

        let mut seen = HashSet::new();
        while let Some(msg) = outbox.try_recv() {
            assert_eq!(msg.channel, channel);
            let Payload::Text(body) = &msg.payload else {
                panic!("Expected a text payload");
            };
            assert!(seen.insert(body.clone()), "duplicate delivery of {body}");
        }
        assert_eq!(seen.len(), (CONNECTIONS / CHANNELS) * MESSAGES);
    }
}

#[test]
fn test_concurrent_publishers_are_seen_in_one_order() {
    const PUBLISHERS: usize = 4;
    const MESSAGES: usize = 200;
    const SUBSCRIBERS: usize = 8;

    for _round in 0..20 {
        let broadcaster = Broadcaster::new(PUBLISHERS * MESSAGES);
        let mut members: Vec<_> = (0..SUBSCRIBERS).map(|_| broadcaster.join("c")).collect();

        std::thread::scope(|scope| {
            for p in 0..PUBLISHERS {
                let broadcaster = &broadcaster;
                scope.spawn(move || {
                    for m in 0..MESSAGES {
                        broadcaster.publish("c", Payload::Text(format!("{p}:{m}")));
                    }
                });
            }
        });

        let sequences: Vec<Vec<Payload>> = members
            .iter_mut()
            .map(|(_, outbox)| {
                let mut seen = Vec::new();
                while let Some(msg) = outbox.try_recv() {
                    seen.push(msg.payload.clone());
                }
                seen
            })
            .collect();

        assert_eq!(sequences[0].len(), PUBLISHERS * MESSAGES);
        for sequence in &sequences[1..] {
            assert_eq!(sequence, &sequences[0]);
        }
    }
}

#[test]
fn test_payload_len() {
    assert_eq!(text("hello").len(), 5);
    assert_eq!(Payload::Binary(vec![1, 2]).len(), 2);
    assert!(text("").is_empty());
    assert!(!Payload::Binary(vec![0]).is_empty());
}
