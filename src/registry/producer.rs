//! Per-channel periodic value producer
//!
//! One producer task runs per active channel. Each tick advances the run's
//! simulated progress through the store and fans the persisted value out to
//! the channel's subscribers. The task stops cooperatively via its channel's
//! cancellation token, and registry teardown awaits the task handle, so no
//! tick can outlive its channel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::run::{RunStore, StoreError};

use super::channel::{Channel, REASON_RUN_DELETED};
use super::store::ChannelRegistry;

pub(crate) struct Producer {
    pub(crate) channel: Arc<Channel>,
    pub(crate) store: Arc<dyn RunStore>,
    /// Weak so detached producer tasks never keep a finished registry alive
    pub(crate) registry: Weak<ChannelRegistry>,
    pub(crate) tick_period: Duration,
    pub(crate) send_timeout: Duration,
}

impl Producer {
    pub(crate) async fn run(self, stop: CancellationToken) {
        let run_id = self.channel.run_id();

        // First tick one full period after the channel comes up.
        let mut ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(run = %run_id, period = ?self.tick_period, "Producer started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let value = rand::random::<f64>() * 100.0;
            let updated = self.store.update(run_id, value).await;

            // A stop requested while the update was in flight must not be
            // followed by another broadcast.
            if stop.is_cancelled() {
                break;
            }

            match updated {
                Ok(snapshot) => {
                    let outcome = self.channel.broadcast(snapshot.value, self.send_timeout).await;
                    if outcome.drained {
                        tracing::info!(
                            run = %run_id,
                            "Last subscriber dropped mid-broadcast, tearing down"
                        );
                        self.deregister().await;
                        break;
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::info!(run = %run_id, "Run deleted, force-closing subscribers");
                    self.channel
                        .force_close(REASON_RUN_DELETED, self.send_timeout)
                        .await;
                    self.deregister().await;
                    break;
                }
                Err(StoreError::Backend(msg)) => {
                    // A store blip should not evict live subscribers.
                    tracing::warn!(run = %run_id, error = %msg, "Store update failed, skipping tick");
                }
            }
        }

        tracing::debug!(run = %run_id, "Producer stopped");
    }

    /// Producer-initiated teardown: mark the stop as taken and drop the
    /// registry entry, unless a fresh channel already replaced this one.
    async fn deregister(&self) {
        self.channel.request_stop();

        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.channel).await;
        }
    }
}
