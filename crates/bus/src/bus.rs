//! Channel-keyed publish/subscribe hub.

use conclave_common::{ConclaveError, Message, MessageDraft, Result};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

/// Callback invoked synchronously for every message on a channel.
pub type SubscriberFn = dyn Fn(&Message) -> Result<()> + Send + Sync;

/// Limits applied by a [`MessageBus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Messages retained per channel; oldest are evicted first.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_max_subscribers")]
    pub max_subscribers_per_channel: usize,
}

fn default_history_limit() -> usize {
    1000
}

fn default_max_subscribers() -> usize {
    100
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_subscribers_per_channel: default_max_subscribers(),
        }
    }
}

struct SubscriberEntry {
    id: u64,
    callback: Arc<SubscriberFn>,
}

struct BusInner {
    config: BusConfig,
    subscribers: RwLock<HashMap<String, Vec<SubscriberEntry>>>,
    history: Mutex<HashMap<String, VecDeque<Arc<Message>>>>,
    /// Held for append + delivery so each channel's subscribers see publish
    /// order. Reentrant: a callback may publish from inside delivery.
    delivery_gate: ReentrantMutex<()>,
    next_subscriber_id: AtomicU64,
    failed_deliveries: AtomicU64,
}

/// In-process message bus.
///
/// Cloning yields another handle to the same bus. There is no global
/// instance; whoever composes the system owns the bus and hands out clones.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscribers: RwLock::new(HashMap::new()),
                history: Mutex::new(HashMap::new()),
                delivery_gate: ReentrantMutex::new(()),
                next_subscriber_id: AtomicU64::new(1),
                failed_deliveries: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Publish a message on its channel.
    ///
    /// Missing `id`, `timestamp` and `priority` are filled in, the message is
    /// appended to the channel history and then delivered to every current
    /// subscriber in subscription order. A failing subscriber is logged and
    /// skipped; it never stops delivery to the others.
    pub fn publish(&self, draft: MessageDraft) -> Result<Arc<Message>> {
        if draft.channel_id.trim().is_empty() {
            return Err(ConclaveError::InvalidMessage(
                "channel_id must not be empty".into(),
            ));
        }
        if draft.sender_id.trim().is_empty() {
            return Err(ConclaveError::InvalidMessage(
                "sender_id must not be empty".into(),
            ));
        }

        let message = Arc::new(draft.complete());

        let _gate = self.inner.delivery_gate.lock();

        self.append_history(&message);

        debug!(
            channel = %message.channel_id,
            sender = %message.sender_id,
            recipient = %message.recipient_id.as_deref().unwrap_or("BROADCAST"),
            message_type = %message.message_type,
            message_id = %message.id,
            content = %message.content_string(),
            "Message published"
        );

        // Snapshot so callbacks can subscribe/unsubscribe without deadlocking.
        let callbacks: Vec<(u64, Arc<SubscriberFn>)> = self
            .inner
            .subscribers
            .read()
            .get(&message.channel_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.id, Arc::clone(&e.callback)))
                    .collect()
            })
            .unwrap_or_default();

        for (subscriber_id, callback) in callbacks {
            self.deliver(subscriber_id, &callback, &message);
        }

        Ok(message)
    }

    fn append_history(&self, message: &Arc<Message>) {
        let limit = self.inner.config.history_limit;
        let mut history = self.inner.history.lock();
        let ring = history.entry(message.channel_id.clone()).or_default();
        ring.push_back(Arc::clone(message));
        while ring.len() > limit {
            ring.pop_front();
        }
    }

    fn deliver(&self, subscriber_id: u64, callback: &Arc<SubscriberFn>, message: &Message) {
        match catch_unwind(AssertUnwindSafe(|| (**callback)(message))) {
            Ok(Ok(())) => {
                trace!(subscriber = subscriber_id, message_id = %message.id, "Delivered");
            }
            Ok(Err(e)) => {
                self.inner.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                error!(
                    channel = %message.channel_id,
                    subscriber = subscriber_id,
                    message_id = %message.id,
                    error = %e,
                    "Subscriber returned an error"
                );
            }
            Err(panic) => {
                self.inner.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(
                    channel = %message.channel_id,
                    subscriber = subscriber_id,
                    message_id = %message.id,
                    panic = %reason,
                    "Subscriber panicked"
                );
            }
        }
    }

    /// Register `callback` for future messages on `channel_id`.
    ///
    /// History is not replayed. Dropping the returned handle unsubscribes.
    pub fn subscribe<F>(&self, channel_id: impl Into<String>, callback: F) -> Result<Subscription>
    where
        F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
    {
        let channel_id = channel_id.into();
        let limit = self.inner.config.max_subscribers_per_channel;

        let mut subscribers = self.inner.subscribers.write();
        let entries = subscribers.entry(channel_id.clone()).or_default();
        if entries.len() >= limit {
            return Err(ConclaveError::SubscriberLimit {
                channel: channel_id,
                limit,
            });
        }

        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        entries.push(SubscriberEntry {
            id,
            callback: Arc::new(callback),
        });

        debug!(channel = %channel_id, subscriber = id, "Subscribed");

        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            channel_id,
            id,
            active: true,
        })
    }

    /// Ordered history for a channel; empty if the channel never existed.
    pub fn channel_history(&self, channel_id: &str) -> Vec<Arc<Message>> {
        self.inner
            .history
            .lock()
            .get(channel_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a channel's history. Live subscriptions are untouched.
    pub fn clear_channel_history(&self, channel_id: &str) {
        if let Some(ring) = self.inner.history.lock().get_mut(channel_id) {
            ring.clear();
        }
    }

    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .get(channel_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Channels that have history or subscribers, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.inner.history.lock().keys().cloned().collect();
        for channel in self.inner.subscribers.read().keys() {
            if !channels.contains(channel) {
                channels.push(channel.clone());
            }
        }
        channels.sort();
        channels
    }

    /// Number of deliveries that failed (error or panic) since creation.
    pub fn failed_deliveries(&self) -> u64 {
        self.inner.failed_deliveries.load(Ordering::Relaxed)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("config", &self.inner.config)
            .field("failed_deliveries", &self.failed_deliveries())
            .finish()
    }
}

fn remove_subscriber(inner: &BusInner, channel_id: &str, id: u64) -> bool {
    let mut subscribers = inner.subscribers.write();
    let Some(entries) = subscribers.get_mut(channel_id) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|e| e.id != id);
    let removed = entries.len() != before;
    if entries.is_empty() {
        subscribers.remove(channel_id);
    }
    removed
}

/// De-registration handle returned by [`MessageBus::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<BusInner>,
    channel_id: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Stop further deliveries to this subscriber.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.bus.upgrade() {
            Some(inner) => {
                let removed = remove_subscriber(&inner, &self.channel_id, self.id);
                if removed {
                    debug!(channel = %self.channel_id, subscriber = self.id, "Unsubscribed");
                }
                removed
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_id", &self.channel_id)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_common::MessageType;
    use std::sync::atomic::AtomicUsize;

    fn note(channel: &str, text: &str) -> MessageDraft {
        MessageDraft::new(MessageType::Notification, "tester", channel, text)
    }

    #[test]
    fn test_publish_completes_message() {
        let bus = MessageBus::default();
        let msg = bus.publish(note("general", "hello")).unwrap();

        assert!(msg.id.starts_with("msg-"));
        assert_eq!(msg.priority, 0);
        assert_eq!(bus.channel_history("general").len(), 1);
    }

    #[test]
    fn test_publish_rejects_missing_channel_or_sender() {
        let bus = MessageBus::default();

        let err = bus.publish(note("", "x")).unwrap_err();
        assert!(matches!(err, ConclaveError::InvalidMessage(_)));

        let err = bus
            .publish(MessageDraft::new(MessageType::Result, " ", "general", "x"))
            .unwrap_err();
        assert!(matches!(err, ConclaveError::InvalidMessage(_)));

        assert!(bus.channel_history("general").is_empty());
    }

    #[test]
    fn test_history_unknown_channel_is_empty() {
        let bus = MessageBus::default();
        assert!(bus.channel_history("nowhere").is_empty());
        bus.clear_channel_history("nowhere");
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = MessageBus::new(BusConfig {
            history_limit: 3,
            ..Default::default()
        });
        for i in 0..5 {
            bus.publish(note("c", &format!("m{}", i))).unwrap();
        }

        let texts: Vec<String> = bus
            .channel_history("c")
            .iter()
            .map(|m| m.content_string())
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_subscriber_limit() {
        let bus = MessageBus::new(BusConfig {
            max_subscribers_per_channel: 2,
            ..Default::default()
        });
        let _a = bus.subscribe("c", |_| Ok(())).unwrap();
        let _b = bus.subscribe("c", |_| Ok(())).unwrap();

        let err = bus.subscribe("c", |_| Ok(())).unwrap_err();
        assert!(matches!(err, ConclaveError::SubscriberLimit { limit: 2, .. }));

        // Other channels are counted separately
        let _other = bus.subscribe("d", |_| Ok(())).unwrap();
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = MessageBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            let _sub = bus
                .subscribe("c", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            bus.publish(note("c", "one")).unwrap();
        }
        bus.publish(note("c", "two")).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("c"), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = MessageBus::default();
        let sub = bus.subscribe("c", |_| Ok(())).unwrap();
        drop(bus);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_channels_listing() {
        let bus = MessageBus::default();
        bus.publish(note("b", "x")).unwrap();
        let _sub = bus.subscribe("a", |_| Ok(())).unwrap();
        assert_eq!(bus.channels(), vec!["a".to_string(), "b".to_string()]);
    }
}
