//! Channel registry for run-progress fan-out
//!
//! The registry multiplexes subscriber links onto per-run channels and
//! drives one periodic producer per active channel.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ChannelRegistry>
//!                 ┌───────────────────────────┐
//!                 │ channels: RwLock<HashMap< │
//!                 │   RunId,                  │
//!                 │   Arc<Channel {           │
//!                 │     subscribers,          │
//!                 │     last_value,           │
//!                 │     producer handle,      │
//!                 │   }>                      │
//!                 │ >>                        │
//!                 └─────────────┬─────────────┘
//!                               │
//!            ┌──────────────────┼──────────────────┐
//!            ▼                  ▼                  ▼
//!       [Producer]        [Subscriber]       [Subscriber]
//!       tick every 3s     send_text()        send_text()
//!            │                  ▲                  ▲
//!            └── RunStore::update ── broadcast ────┘
//! ```
//!
//! # Lifecycle
//!
//! A channel is created by the first [`connect`](store::ChannelRegistry::connect)
//! for its run id and destroyed when its subscriber set empties or its run
//! vanishes. Teardown is explicit: the producer's stop is requested, observed
//! within one tick period, and confirmed (the task has exited) before the
//! channel counts as gone. A later connect for the same run id starts over
//! with a fresh channel and producer.

pub mod channel;
pub mod config;
pub mod error;
pub mod producer;
pub mod store;

pub use channel::{Channel, ChannelState, ChannelStats, REASON_RUN_DELETED, REASON_UNRESPONSIVE};
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use store::ChannelRegistry;
