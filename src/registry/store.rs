//! Channel registry implementation
//!
//! The process-wide directory of active broadcast channels, keyed by run id.
//! Every create/attach/remove decision happens under one write lock, so
//! concurrent first subscribers can never race two channels into existence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::link::{SubscriberId, SubscriberLink};
use crate::run::{RunId, RunStore};

use super::channel::{Channel, ChannelStats, DetachOutcome};
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::producer::Producer;

/// Process-wide directory of active broadcast channels
///
/// Construct one per process, wrap it in an `Arc`, and hand it to the
/// serving layer. Connects and disconnects arrive from request handlers;
/// producers deregister their own channels on the teardown paths they
/// initiate.
pub struct ChannelRegistry {
    /// Map of run id to its live channel
    channels: RwLock<HashMap<RunId, Arc<Channel>>>,

    /// Persistence capability, shared with every producer
    store: Arc<dyn RunStore>,

    /// Configuration
    config: RegistryConfig,

    /// Allocator for subscriber ids
    next_subscriber_id: AtomicU64,
}

impl ChannelRegistry {
    /// Create a registry with default configuration
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(store: Arc<dyn RunStore>, config: RegistryConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            store,
            config,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attach `link` to the channel for `run_id`, creating the channel and
    /// starting its producer on first subscription
    ///
    /// The handshake completes before anything is registered; a link that
    /// fails it is simply dropped. Subscribing to an unknown run fails with
    /// [`RegistryError::RunNotFound`] and creates nothing.
    pub async fn connect(
        self: &Arc<Self>,
        run_id: RunId,
        link: Arc<dyn SubscriberLink>,
    ) -> Result<SubscriberId, RegistryError> {
        link.accept().await.map_err(|_| RegistryError::PeerGone)?;

        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));

        let mut channels = self.channels.write().await;

        if let Some(channel) = channels.get(&run_id) {
            if let Ok(subscribers) = channel.attach(id, Arc::clone(&link)).await {
                tracing::info!(
                    run = %run_id,
                    subscriber = %id,
                    subscribers,
                    "Subscriber attached"
                );
                return Ok(id);
            }
            // The entry is draining and its producer is on the way out.
            // Fall through and replace it with a fresh channel.
        }

        let snapshot = self.store.lookup(run_id).await?;

        let channel = Arc::new(Channel::with_subscriber(run_id, snapshot.value, id, link));

        let producer = Producer {
            channel: Arc::clone(&channel),
            store: Arc::clone(&self.store),
            registry: Arc::downgrade(self),
            tick_period: self.config.tick_period,
            send_timeout: self.config.send_timeout,
        };
        let handle = tokio::spawn(producer.run(channel.stop_token()));
        channel.set_producer(handle).await;

        channels.insert(run_id, channel);

        tracing::info!(run = %run_id, subscriber = %id, "Channel created");

        Ok(id)
    }

    /// Detach a subscriber from whichever channel owns it
    ///
    /// Teardown of the channel (when this was the last subscriber) is
    /// confirmed before returning: the map entry is gone and the producer
    /// task has exited.
    pub async fn disconnect(&self, id: SubscriberId) {
        let drained = {
            let mut channels = self.channels.write().await;

            let mut drained_run = None;
            let mut found = false;
            for (run_id, channel) in channels.iter() {
                match channel.detach(id).await {
                    DetachOutcome::NotMember => continue,
                    DetachOutcome::Detached { remaining } => {
                        tracing::info!(
                            run = %run_id,
                            subscriber = %id,
                            subscribers = remaining,
                            "Subscriber detached"
                        );
                    }
                    DetachOutcome::Drained => {
                        drained_run = Some(*run_id);
                    }
                }
                found = true;
                break;
            }

            if !found {
                tracing::debug!(subscriber = %id, "Disconnect for unknown subscriber");
            }

            drained_run.and_then(|run_id| channels.remove(&run_id))
        };

        if let Some(channel) = drained {
            channel.request_stop();
            channel.join_producer().await;
            tracing::info!(run = %channel.run_id(), "Channel torn down, no subscribers left");
        }
    }

    /// Drop a channel's map entry if it is still the registered one
    ///
    /// Called from producers on the teardown paths they initiate. The
    /// `ptr_eq` check keeps a draining channel from evicting the fresh one
    /// that may already have replaced it.
    pub(crate) async fn deregister(&self, channel: &Arc<Channel>) {
        let mut channels = self.channels.write().await;

        if let Some(current) = channels.get(&channel.run_id()) {
            if Arc::ptr_eq(current, channel) {
                channels.remove(&channel.run_id());
                tracing::info!(run = %channel.run_id(), "Channel deregistered");
            }
        }
    }

    /// Number of active channels
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Whether a channel currently exists for `run_id`
    pub async fn is_active(&self, run_id: RunId) -> bool {
        self.channels.read().await.contains_key(&run_id)
    }

    /// The live channel for `run_id`, if any
    pub async fn channel(&self, run_id: RunId) -> Option<Arc<Channel>> {
        self.channels.read().await.get(&run_id).cloned()
    }

    /// Point-in-time statistics for the channel of `run_id`
    pub async fn stats(&self, run_id: RunId) -> Option<ChannelStats> {
        let channel = self.channel(run_id).await;
        if let Some(channel) = channel {
            Some(channel.stats().await)
        } else {
            None
        }
    }
}
