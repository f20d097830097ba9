//! The notification capability the peripheral runs on.
//!
//! The platform layer (GATT service, advertising) is outside this crate. All
//! the peripheral needs from it is "who listens on this channel" and "send
//! these bytes to that listener", captured by [`Transport`].
//! [`LoopbackTransport`] is an in-process implementation used by the
//! simulator and the tests.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;
use uuid::Uuid;

use crate::error::TransportError;

/// Identifies one connected central listening on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Future returned by [`Transport::notify`].
pub type NotifyFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// Subscription lookup and per-subscriber notification.
pub trait Transport: Send + Sync + 'static {
    /// Whether the channel is part of the published service.
    fn has_channel(&self, channel: &Uuid) -> bool;

    /// Current subscribers of a channel.
    fn subscribers(&self, channel: &Uuid) -> Vec<SubscriberId>;

    /// Number of current subscribers.
    fn subscriber_count(&self, channel: &Uuid) -> usize {
        self.subscribers(channel).len()
    }

    /// Sends one notification. Completes when the platform accepted it.
    fn notify(&self, channel: Uuid, subscriber: SubscriberId, bytes: Vec<u8>) -> NotifyFuture;
}

/// A notification captured by [`LoopbackTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Uuid,
    pub subscriber: SubscriberId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    channels: HashMap<Uuid, Vec<SubscriberId>>,
    delivered: Vec<Notification>,
    /// Successful sends left before a subscriber starts failing.
    fail_after: HashMap<SubscriberId, usize>,
    next_subscriber: u64,
}

/// In-memory transport that records every notification.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
    latency: Option<Duration>,
}

impl LoopbackTransport {
    /// Transport with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport publishing the given channels.
    pub fn with_channels(channels: impl IntoIterator<Item = Uuid>) -> Self {
        let transport = Self::new();
        for channel in channels {
            transport.add_channel(channel);
        }
        transport
    }

    /// Delays every notification, simulating a slow link.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `channel` with no subscribers. Existing subscribers are kept.
    pub fn add_channel(&self, channel: Uuid) {
        self.lock().channels.entry(channel).or_default();
    }

    /// Adds a new subscriber to `channel` and returns its id.
    pub fn subscribe(&self, channel: Uuid) -> SubscriberId {
        let mut state = self.lock();
        state.next_subscriber += 1;
        let id = SubscriberId(state.next_subscriber);
        state.channels.entry(channel).or_default().push(id);
        id
    }

    /// Removes `subscriber` from `channel`.
    pub fn unsubscribe(&self, channel: &Uuid, subscriber: SubscriberId) {
        if let Some(subs) = self.lock().channels.get_mut(channel) {
            subs.retain(|s| *s != subscriber);
        }
    }

    /// Makes sends to `subscriber` fail after `successes` more deliveries.
    pub fn fail_after(&self, subscriber: SubscriberId, successes: usize) {
        self.lock().fail_after.insert(subscriber, successes);
    }

    /// Clears a failure set with [`fail_after`](Self::fail_after).
    pub fn heal(&self, subscriber: SubscriberId) {
        self.lock().fail_after.remove(&subscriber);
    }

    /// Every notification delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<Notification> {
        self.lock().delivered.clone()
    }

    /// Payloads delivered to one subscriber on one channel.
    pub fn delivered_to(&self, channel: &Uuid, subscriber: SubscriberId) -> Vec<Vec<u8>> {
        self.lock()
            .delivered
            .iter()
            .filter(|n| n.channel == *channel && n.subscriber == subscriber)
            .map(|n| n.bytes.clone())
            .collect()
    }

    /// Removes and returns everything delivered so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut self.lock().delivered)
    }

    fn deliver(&self, notification: Notification) -> Result<(), TransportError> {
        let mut state = self.lock();
        let Some(subs) = state.channels.get(&notification.channel) else {
            return Err(TransportError::UnknownChannel {
                channel: notification.channel,
            });
        };
        if !subs.contains(&notification.subscriber) {
            return Err(TransportError::NotSubscribed {
                channel: notification.channel,
                subscriber: notification.subscriber,
            });
        }
        if let Some(left) = state.fail_after.get_mut(&notification.subscriber) {
            if *left == 0 {
                return Err(TransportError::send_failed(
                    notification.subscriber,
                    "link dropped",
                ));
            }
            *left -= 1;
        }
        trace!(
            channel = %notification.channel,
            subscriber = %notification.subscriber,
            len = notification.bytes.len(),
            "Loopback notify"
        );
        state.delivered.push(notification);
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn has_channel(&self, channel: &Uuid) -> bool {
        self.lock().channels.contains_key(channel)
    }

    fn subscribers(&self, channel: &Uuid) -> Vec<SubscriberId> {
        self.lock().channels.get(channel).cloned().unwrap_or_default()
    }

    fn notify(&self, channel: Uuid, subscriber: SubscriberId, bytes: Vec<u8>) -> NotifyFuture {
        let this = self.clone();
        Box::pin(async move {
            if let Some(latency) = this.latency {
                tokio::time::sleep(latency).await;
            }
            this.deliver(Notification {
                channel,
                subscriber,
                bytes,
            })
        })
    }
}
