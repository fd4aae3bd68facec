//! Integration tests for bus delivery and history semantics.

use conclave_bus::{BusConfig, MessageBus};
use conclave_common::{ConclaveError, Message, MessageDraft, MessageType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn draft(channel: &str, text: &str) -> MessageDraft {
    MessageDraft::new(MessageType::Notification, "tester", channel, text)
}

/// Subscribes a recorder that keeps every delivered message's text.
fn recorder(bus: &MessageBus, channel: &str) -> (conclave_bus::Subscription, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = bus
        .subscribe(channel, move |msg: &Message| {
            sink.lock().push(msg.content_string());
            Ok(())
        })
        .unwrap();
    (sub, seen)
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_history_keeps_publish_order_below_cap() {
    let bus = MessageBus::default();
    for i in 0..10 {
        bus.publish(draft("c", &i.to_string())).unwrap();
    }

    let history = bus.channel_history("c");
    assert_eq!(history.len(), 10);
    for (i, msg) in history.iter().enumerate() {
        assert_eq!(msg.content_string(), i.to_string());
    }
}

#[test]
fn test_history_evicts_oldest_beyond_default_cap() {
    let bus = MessageBus::default();
    let n = 1_250;
    for i in 0..n {
        bus.publish(draft("c", &i.to_string())).unwrap();
    }

    let history = bus.channel_history("c");
    assert_eq!(history.len(), 1_000);
    assert_eq!(history.first().unwrap().content_string(), (n - 1_000).to_string());
    assert_eq!(history.last().unwrap().content_string(), (n - 1).to_string());
}

#[test]
fn test_clear_history_keeps_subscribers() {
    let bus = MessageBus::default();
    let (_sub, seen) = recorder(&bus, "c");

    bus.publish(draft("c", "before")).unwrap();
    bus.clear_channel_history("c");
    assert!(bus.channel_history("c").is_empty());

    bus.publish(draft("c", "after")).unwrap();
    assert_eq!(bus.channel_history("c").len(), 1);
    assert_eq!(*seen.lock(), vec!["before", "after"]);
}

#[test]
fn test_history_is_per_channel() {
    let bus = MessageBus::default();
    bus.publish(draft("a", "1")).unwrap();
    bus.publish(draft("b", "2")).unwrap();
    bus.publish(draft("a", "3")).unwrap();

    assert_eq!(bus.channel_history("a").len(), 2);
    assert_eq!(bus.channel_history("b").len(), 1);
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_exactly_one_delivery_per_subscriber() {
    let bus = MessageBus::default();
    let (_a, seen_a) = recorder(&bus, "team");
    let (_b, seen_b) = recorder(&bus, "team");
    let (_other, seen_other) = recorder(&bus, "elsewhere");

    bus.publish(draft("team", "hello")).unwrap();

    assert_eq!(*seen_a.lock(), vec!["hello"]);
    assert_eq!(*seen_b.lock(), vec!["hello"]);
    assert!(seen_other.lock().is_empty());
}

#[test]
fn test_no_history_replay_on_subscribe() {
    let bus = MessageBus::default();
    bus.publish(draft("c", "old")).unwrap();

    let (_sub, seen) = recorder(&bus, "c");
    assert!(seen.lock().is_empty());
}

#[test]
fn test_delivery_in_subscription_order() {
    let bus = MessageBus::default();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut subs = Vec::new();
    for name in ["first", "second", "third"] {
        let order = order.clone();
        subs.push(
            bus.subscribe("c", move |_| {
                order.lock().push(name);
                Ok(())
            })
            .unwrap(),
        );
    }

    bus.publish(draft("c", "x")).unwrap();
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let bus = MessageBus::default();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let sub = bus
        .subscribe("c", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    bus.publish(draft("c", "one")).unwrap();
    assert!(sub.unsubscribe());
    bus.publish(draft("c", "two")).unwrap();
    bus.publish(draft("c", "three")).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_subscribers_are_isolated() {
    let bus = MessageBus::default();

    let _err = bus
        .subscribe("c", |_| Err(ConclaveError::Generation("nope".into())))
        .unwrap();
    let _panics = bus
        .subscribe("c", |_| -> conclave_common::Result<()> { panic!("subscriber blew up") })
        .unwrap();
    let (_ok, seen) = recorder(&bus, "c");

    bus.publish(draft("c", "one")).unwrap();
    bus.publish(draft("c", "two")).unwrap();

    assert_eq!(*seen.lock(), vec!["one", "two"]);
    assert_eq!(bus.failed_deliveries(), 4);
    assert_eq!(bus.channel_history("c").len(), 2);
}

#[test]
fn test_subscriber_may_publish_reentrantly() {
    let bus = MessageBus::default();
    let echo_bus = bus.clone();
    let _echo = bus
        .subscribe("in", move |msg: &Message| {
            echo_bus.publish(MessageDraft::new(
                MessageType::Result,
                "echo",
                "out",
                format!("echo: {}", msg.content_string()),
            ))?;
            Ok(())
        })
        .unwrap();
    let (_out, seen) = recorder(&bus, "out");

    bus.publish(draft("in", "ping")).unwrap();

    assert_eq!(*seen.lock(), vec!["echo: ping"]);
}

#[test]
fn test_subscriber_may_unsubscribe_during_delivery() {
    let bus = MessageBus::default();
    let slot: Arc<Mutex<Option<conclave_bus::Subscription>>> = Arc::new(Mutex::new(None));
    let count = Arc::new(AtomicUsize::new(0));

    let own_slot = slot.clone();
    let counter = count.clone();
    let sub = bus
        .subscribe("c", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            own_slot.lock().take();
            Ok(())
        })
        .unwrap();
    *slot.lock() = Some(sub);

    bus.publish(draft("c", "one")).unwrap();
    bus.publish(draft("c", "two")).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count("c"), 0);
}

#[test]
fn test_parallel_publishers_preserve_per_subscriber_order() {
    let bus = MessageBus::new(BusConfig {
        history_limit: 10_000,
        ..Default::default()
    });
    let (_sub, seen) = recorder(&bus, "c");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let bus = bus.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    bus.publish(draft("c", &format!("{}-{}", t, i))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history: Vec<String> = bus
        .channel_history("c")
        .iter()
        .map(|m| m.content_string())
        .collect();
    assert_eq!(history.len(), 1_000);
    // The subscriber observed exactly the history order
    assert_eq!(*seen.lock(), history);
}

#[test]
fn test_priority_does_not_reorder() {
    let bus = MessageBus::default();
    let (_sub, seen) = recorder(&bus, "c");

    bus.publish(draft("c", "low").with_priority(0)).unwrap();
    bus.publish(draft("c", "high").with_priority(9)).unwrap();

    assert_eq!(*seen.lock(), vec!["low", "high"]);
}
