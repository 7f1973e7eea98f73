//! Fan-out distribution bus.
//!
//! Every subscriber owns a private bounded `crossbeam_channel` queue registered with
//! the bus. `Bus::publish` copies the frame (an `Arc<str>`, so only a pointer) into
//! every registered queue while holding the registry lock, which makes a publish
//! atomic with respect to subscribe/unsubscribe:
//!
//! - a subscription registered before `publish` returns sees the frame;
//! - a subscription registered afterwards never does.
//!
//! When a subscriber queue is full the configured [`SlowSubscriberPolicy`] decides
//! between evicting the oldest queued frame and detaching the subscriber.

use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};
use parking_lot::Mutex;
use relay_common::{RelayError, Result};
use strum_macros::Display;

/// Serialized command shared read-only by all subscriber queues.
pub type Frame = Arc<str>;

/// Default number of frames a subscriber may lag behind.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// What to do when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SlowSubscriberPolicy {
    /// Evict the oldest queued frame to make room for the new one.
    #[default]
    DropOldest,
    /// Detach the subscriber; its session closes once the queue is drained.
    Disconnect,
}

/// Identity of a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    id: SubscriberId,
    tx: Sender<Frame>,
    // Kept so the publisher can evict from the head of a full queue.
    rx: Receiver<Frame>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    slots: Vec<Slot>,
    closed: bool,
}

/// Multi-producer broadcast bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct Bus {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
    policy: SlowSubscriberPolicy,
}

impl Bus {
    /// Create a bus whose subscriber queues hold at most `capacity` frames.
    pub fn new(capacity: usize, policy: SlowSubscriberPolicy) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Register a new subscriber queue.
    pub fn subscribe(&self) -> Result<Subscription> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(RelayError::BusClosed);
        }
        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;

        let (tx, rx) = bounded(self.capacity);
        registry.slots.push(Slot {
            id,
            tx,
            rx: rx.clone(),
        });
        debug!("Subscriber {} registered. Total: {}", id, registry.slots.len());

        Ok(Subscription {
            id,
            rx,
            bus: self.clone(),
        })
    }

    /// Queue `frame` for every registered subscriber.
    ///
    /// Returns the number of subscribers the frame was queued for.
    pub fn publish(&self, frame: impl Into<Frame>) -> Result<usize> {
        let frame = frame.into();
        let policy = self.policy;
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(RelayError::BusClosed);
        }

        let mut delivered = 0;
        registry.slots.retain(|slot| match slot.tx.try_send(Arc::clone(&frame)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(frame)) => match policy {
                SlowSubscriberPolicy::DropOldest => {
                    let _ = slot.rx.try_recv();
                    if slot.tx.try_send(frame).is_ok() {
                        delivered += 1;
                    }
                    warn!("Subscriber {} is lagging: dropped oldest frame", slot.id);
                    true
                }
                SlowSubscriberPolicy::Disconnect => {
                    warn!("Subscriber {} is lagging: disconnecting", slot.id);
                    false
                }
            },
            Err(TrySendError::Disconnected(_)) => false,
        });
        Ok(delivered)
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().slots.len()
    }

    /// Detach every subscriber and refuse further publishes.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        registry.closed = true;
        let detached = registry.slots.len();
        registry.slots.clear();
        debug!("Bus closed, {} subscriber(s) detached", detached);
    }

    /// `true` once [`Bus::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    fn unsubscribe(&self, id: SubscriberId) {
        let mut registry = self.registry.lock();
        registry.slots.retain(|slot| slot.id != id);
        debug!("Subscriber {} removed. Total: {}", id, registry.slots.len());
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY, SlowSubscriberPolicy::default())
    }
}

/// Receiving end of one subscriber queue. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    rx: Receiver<Frame>,
    bus: Bus,
}

impl Subscription {
    /// Identity assigned at subscription time.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Underlying queue, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<Frame> {
        &self.rx
    }

    /// Block until the next frame; `None` once the subscriber has been detached and
    /// the queue is drained.
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    /// Next queued frame, if any, without blocking.
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn every_subscriber_receives_each_frame() {
        let bus = Bus::default();
        let first = bus.subscribe().unwrap();
        let second = bus.subscribe().unwrap();

        assert_eq!(bus.publish("hello").unwrap(), 2);

        assert_eq!(first.try_recv().as_deref(), Some("hello"));
        assert_eq!(second.try_recv().as_deref(), Some("hello"));
    }

    #[test]
    fn frames_arrive_in_publish_order() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();
        for i in 0..10 {
            bus.publish(format!("frame-{}", i)).unwrap();
        }
        let received: Vec<String> = (0..10).map(|_| sub.recv().unwrap().to_string()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("frame-{}", i)).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn late_subscriber_sees_only_new_frames() {
        let bus = Bus::default();
        bus.publish("before").unwrap();
        let sub = bus.subscribe().unwrap();
        bus.publish("after").unwrap();
        assert_eq!(sub.try_recv().as_deref(), Some("after"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish("nobody").unwrap(), 0);
    }

    #[test]
    fn drop_oldest_keeps_latest_frames() {
        let bus = Bus::new(2, SlowSubscriberPolicy::DropOldest);
        let sub = bus.subscribe().unwrap();
        for frame in ["a", "b", "c"] {
            assert_eq!(bus.publish(frame).unwrap(), 1);
        }
        assert_eq!(sub.try_recv().as_deref(), Some("b"));
        assert_eq!(sub.try_recv().as_deref(), Some("c"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn disconnect_policy_detaches_lagging_subscriber() {
        let bus = Bus::new(1, SlowSubscriberPolicy::Disconnect);
        let slow = bus.subscribe().unwrap();
        let fast = bus.subscribe().unwrap();

        bus.publish("a").unwrap();
        assert_eq!(fast.try_recv().as_deref(), Some("a"));
        assert_eq!(bus.publish("b").unwrap(), 1);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(slow.recv().as_deref(), Some("a"));
        assert_eq!(slow.recv(), None);
        assert_eq!(fast.recv().as_deref(), Some("b"));
    }

    #[test]
    fn closed_bus_rejects_publish_and_subscribe() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();
        bus.close();

        assert!(bus.is_closed());
        assert!(matches!(bus.publish("late"), Err(RelayError::BusClosed)));
        assert!(matches!(bus.subscribe(), Err(RelayError::BusClosed)));
        assert_eq!(sub.recv(), None);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let bus = Bus::new(1000, SlowSubscriberPolicy::DropOldest);
        let sub = bus.subscribe().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        bus.publish(format!("{}:{}", p, i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut per_producer = vec![Vec::new(); 4];
        while let Some(frame) = sub.try_recv() {
            let (p, i) = frame.split_once(':').unwrap();
            per_producer[p.parse::<usize>().unwrap()].push(i.parse::<u32>().unwrap());
        }
        for seen in per_producer {
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        }
    }
}
