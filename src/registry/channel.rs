//! Per-run broadcast channel
//!
//! A channel owns the subscriber set and the last known value for one
//! simulation run. Membership is guarded by its own lock so producer fan-out
//! never blocks registry operations on other runs, and link I/O always
//! happens outside that lock so one slow peer cannot stall attach/detach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::link::{SubscriberId, SubscriberLink};
use crate::run::RunId;

/// Close reason sent when the backing run disappears mid-life
pub const REASON_RUN_DELETED: &str = "resource no longer exists";

/// Close reason sent when a subscriber is dropped after a failed delivery
pub const REASON_UNRESPONSIVE: &str = "subscriber unresponsive";

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Subscribers attached, producer ticking
    Active,
    /// Subscriber set emptied or run vanished; producer stop in progress
    Draining,
}

/// Marker error: the channel is already draining and accepts no members
#[derive(Debug)]
pub(crate) struct ChannelDraining;

/// What a detach did, so the caller can act on the empty-set transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetachOutcome {
    /// The subscriber was not attached here
    NotMember,
    /// Removed; others remain
    Detached { remaining: usize },
    /// Removed the last subscriber; this call began the teardown
    Drained,
}

/// What a broadcast did, as seen by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BroadcastOutcome {
    /// Subscribers that received the message
    pub delivered: usize,
    /// Subscribers dropped after a failed or timed-out send
    pub dropped: usize,
    /// The set emptied during this broadcast; this call began the teardown
    pub drained: bool,
}

struct ChannelInner {
    subscribers: HashMap<SubscriberId, Arc<dyn SubscriberLink>>,
    last_value: Option<f64>,
    state: ChannelState,
}

/// In-memory fan-out unit for one simulation run
pub struct Channel {
    run_id: RunId,
    inner: Mutex<ChannelInner>,
    stop: CancellationToken,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Create a channel with its first subscriber already attached
    ///
    /// Channels never exist empty: the registry builds one around the
    /// subscriber that caused it.
    pub(crate) fn with_subscriber(
        run_id: RunId,
        initial_value: f64,
        id: SubscriberId,
        link: Arc<dyn SubscriberLink>,
    ) -> Self {
        let mut subscribers: HashMap<SubscriberId, Arc<dyn SubscriberLink>> = HashMap::new();
        subscribers.insert(id, link);

        Self {
            run_id,
            inner: Mutex::new(ChannelInner {
                subscribers,
                last_value: Some(initial_value),
                state: ChannelState::Active,
            }),
            stop: CancellationToken::new(),
            producer: Mutex::new(None),
        }
    }

    /// Run this channel fans out
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Token the producer watches for its stop signal
    pub(crate) fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Hand the channel its producer task handle
    pub(crate) async fn set_producer(&self, handle: JoinHandle<()>) {
        *self.producer.lock().await = Some(handle);
    }

    /// Add a subscriber
    ///
    /// Fails when the channel is already draining; the caller must then
    /// treat this channel as gone and build a fresh one.
    pub(crate) async fn attach(
        &self,
        id: SubscriberId,
        link: Arc<dyn SubscriberLink>,
    ) -> Result<usize, ChannelDraining> {
        let mut inner = self.inner.lock().await;

        if inner.state != ChannelState::Active {
            return Err(ChannelDraining);
        }

        inner.subscribers.insert(id, link);
        Ok(inner.subscribers.len())
    }

    /// Remove a subscriber
    ///
    /// Removing the last one transitions the channel to draining exactly
    /// once; the [`DetachOutcome::Drained`] caller owns the rest of the
    /// teardown.
    pub(crate) async fn detach(&self, id: SubscriberId) -> DetachOutcome {
        let mut inner = self.inner.lock().await;

        if inner.subscribers.remove(&id).is_none() {
            return DetachOutcome::NotMember;
        }

        if inner.subscribers.is_empty() && begin_drain(&mut inner) {
            DetachOutcome::Drained
        } else {
            DetachOutcome::Detached {
                remaining: inner.subscribers.len(),
            }
        }
    }

    /// Send `value`, formatted to two decimal places, to every subscriber
    ///
    /// Each delivery gets its own bounded attempt; a subscriber whose send
    /// fails or times out is dropped and closed best-effort, without
    /// disturbing delivery to the rest.
    pub(crate) async fn broadcast(&self, value: f64, send_timeout: Duration) -> BroadcastOutcome {
        let message = format_value(value);

        let targets: Vec<(SubscriberId, Arc<dyn SubscriberLink>)> = {
            let mut inner = self.inner.lock().await;
            inner.last_value = Some(value);
            inner
                .subscribers
                .iter()
                .map(|(id, link)| (*id, Arc::clone(link)))
                .collect()
        };

        let mut failed = Vec::new();
        for (id, link) in &targets {
            match tokio::time::timeout(send_timeout, link.send_text(&message)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => failed.push(*id),
            }
        }

        if failed.is_empty() {
            return BroadcastOutcome {
                delivered: targets.len(),
                dropped: 0,
                drained: false,
            };
        }

        let (drained, dropped_links) = {
            let mut inner = self.inner.lock().await;
            let mut links = Vec::with_capacity(failed.len());
            for id in &failed {
                if let Some(link) = inner.subscribers.remove(id) {
                    links.push(link);
                }
            }
            let drained = inner.subscribers.is_empty() && begin_drain(&mut inner);
            (drained, links)
        };

        for link in dropped_links {
            let _ = tokio::time::timeout(send_timeout, link.close(REASON_UNRESPONSIVE)).await;
        }

        tracing::debug!(
            run = %self.run_id,
            delivered = targets.len() - failed.len(),
            dropped = failed.len(),
            "Broadcast dropped unresponsive subscribers"
        );

        BroadcastOutcome {
            delivered: targets.len() - failed.len(),
            dropped: failed.len(),
            drained,
        }
    }

    /// Evict every subscriber with `reason` and begin teardown
    ///
    /// Used when the backing run disappears; unlike a graceful drain this
    /// actively closes still-connected peers.
    pub(crate) async fn force_close(&self, reason: &str, close_timeout: Duration) {
        let links: Vec<Arc<dyn SubscriberLink>> = {
            let mut inner = self.inner.lock().await;
            begin_drain(&mut inner);
            inner.subscribers.drain().map(|(_, link)| link).collect()
        };

        for link in &links {
            let _ = tokio::time::timeout(close_timeout, link.close(reason)).await;
        }

        tracing::info!(
            run = %self.run_id,
            evicted = links.len(),
            reason,
            "Channel force-closed"
        );
    }

    /// Request producer stop. Idempotent.
    pub(crate) fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the producer task to exit
    ///
    /// Idempotent: returns immediately once the handle has been claimed.
    pub(crate) async fn join_producer(&self) {
        let handle = self.producer.lock().await.take();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(run = %self.run_id, error = %err, "Producer task panicked");
            }
        }
    }

    /// Number of currently attached subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    /// Last value handed to subscribers (the persisted value at creation,
    /// until the first broadcast)
    pub async fn last_value(&self) -> Option<f64> {
        self.inner.lock().await.last_value
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ChannelState {
        self.inner.lock().await.state
    }

    /// Point-in-time view of the channel
    pub async fn stats(&self) -> ChannelStats {
        let inner = self.inner.lock().await;
        ChannelStats {
            run_id: self.run_id,
            subscriber_count: inner.subscribers.len(),
            last_value: inner.last_value,
            state: inner.state,
        }
    }
}

/// Statistics for a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    /// Run this channel fans out
    pub run_id: RunId,
    /// Number of attached subscribers
    pub subscriber_count: usize,
    /// Last broadcast value
    pub last_value: Option<f64>,
    /// Current lifecycle state
    pub state: ChannelState,
}

/// Transition to draining. Returns whether this call made the transition;
/// only that caller may act on it.
fn begin_drain(inner: &mut ChannelInner) -> bool {
    if inner.state == ChannelState::Active {
        inner.state = ChannelState::Draining;
        true
    } else {
        false
    }
}

/// Format a progress value the way subscribers see it: exactly two decimals
pub(crate) fn format_value(value: f64) -> String {
    format!("{:.2}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLink;

    const RUN: RunId = RunId(7);
    const TIMEOUT: Duration = Duration::from_millis(100);

    fn channel_with(link: Arc<MockLink>) -> Channel {
        Channel::with_subscriber(RUN, -1.0, SubscriberId(1), link)
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.169), "42.17");
        assert_eq!(format_value(0.0), "0.00");
        assert_eq!(format_value(99.5), "99.50");
        assert_eq!(format_value(-1.0), "-1.00");
    }

    #[tokio::test]
    async fn test_membership() {
        let channel = channel_with(MockLink::new());

        assert_eq!(channel.subscriber_count().await, 1);
        assert_eq!(channel.state().await, ChannelState::Active);
        assert_eq!(channel.last_value().await, Some(-1.0));

        let attached = channel.attach(SubscriberId(2), MockLink::new()).await;
        assert_eq!(attached.unwrap(), 2);

        assert_eq!(
            channel.detach(SubscriberId(2)).await,
            DetachOutcome::Detached { remaining: 1 }
        );
        assert_eq!(channel.detach(SubscriberId(2)).await, DetachOutcome::NotMember);
    }

    #[tokio::test]
    async fn test_last_detach_drains_once() {
        let channel = channel_with(MockLink::new());

        assert_eq!(channel.detach(SubscriberId(1)).await, DetachOutcome::Drained);
        assert_eq!(channel.state().await, ChannelState::Draining);

        // A second detach can neither re-drain nor find the subscriber
        assert_eq!(channel.detach(SubscriberId(1)).await, DetachOutcome::NotMember);

        // Draining channels accept no members
        assert!(channel.attach(SubscriberId(3), MockLink::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_broadcast_delivers_formatted_value() {
        let a = MockLink::new();
        let channel = channel_with(Arc::clone(&a));
        let b = MockLink::new();
        channel.attach(SubscriberId(2), Arc::clone(&b) as _).await.unwrap();

        let outcome = channel.broadcast(42.169, TIMEOUT).await;

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.dropped, 0);
        assert!(!outcome.drained);
        assert_eq!(a.messages(), vec!["42.17".to_string()]);
        assert_eq!(b.messages(), vec!["42.17".to_string()]);
        assert_eq!(channel.last_value().await, Some(42.169));
    }

    #[tokio::test]
    async fn test_broadcast_drops_failed_subscriber() {
        let good = MockLink::new();
        let channel = channel_with(Arc::clone(&good));
        let bad = MockLink::failing_send();
        channel.attach(SubscriberId(2), Arc::clone(&bad) as _).await.unwrap();

        let outcome = channel.broadcast(10.0, TIMEOUT).await;

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dropped, 1);
        assert!(!outcome.drained);
        assert_eq!(good.messages(), vec!["10.00".to_string()]);
        assert_eq!(channel.subscriber_count().await, 1);
        assert_eq!(bad.close_reason().as_deref(), Some(REASON_UNRESPONSIVE));
        assert_eq!(channel.state().await, ChannelState::Active);
    }

    #[tokio::test]
    async fn test_broadcast_drains_on_last_failure() {
        let bad = MockLink::failing_send();
        let channel = channel_with(Arc::clone(&bad));

        let outcome = channel.broadcast(10.0, TIMEOUT).await;

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.drained);
        assert_eq!(channel.state().await, ChannelState::Draining);
    }

    #[tokio::test]
    async fn test_force_close_evicts_everyone() {
        let a = MockLink::new();
        let channel = channel_with(Arc::clone(&a));
        let b = MockLink::new();
        channel.attach(SubscriberId(2), Arc::clone(&b) as _).await.unwrap();

        channel.force_close(REASON_RUN_DELETED, TIMEOUT).await;

        assert_eq!(channel.subscriber_count().await, 0);
        assert_eq!(channel.state().await, ChannelState::Draining);
        assert_eq!(a.close_reason().as_deref(), Some(REASON_RUN_DELETED));
        assert_eq!(b.close_reason().as_deref(), Some(REASON_RUN_DELETED));
    }
}
