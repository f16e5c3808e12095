//! # simcast
//!
//! Near-real-time fan-out of simulation run progress to subscribed clients.
//!
//! This crate is the connection-management core of a run-monitoring service:
//! it multiplexes subscriber links onto per-run channels, drives one periodic
//! value producer per active channel, and tears channels down when the last
//! subscriber leaves or the backing run disappears. Transport and persistence
//! stay with the embedder, behind the [`SubscriberLink`] and [`RunStore`]
//! capabilities.
//!
//! ```text
//!    request handlers                      Arc<ChannelRegistry>
//!    connect/disconnect ────────────► RunId -> Arc<Channel> (one lock)
//!                                               │
//!                                     one Producer task per channel
//!                                               │ tick (3s default)
//!                                     RunStore::update(id, value)
//!                                               │
//!                                     Channel::broadcast("42.17")
//!                                       │        │        │
//!                                      link     link     link
//! ```
//!
//! A subscription enters through [`ChannelRegistry::connect`] with a run id
//! and a link; the registry attaches it to the run's channel, creating the
//! channel and starting its producer if this is the first subscriber. Every
//! tick, each attached link receives the run's current value as text with
//! exactly two decimal places. [`ChannelRegistry::disconnect`] detaches a
//! link, and an emptied channel is torn down with its producer's exit
//! confirmed before the registry forgets it.

pub mod link;
pub mod registry;
pub mod run;

#[cfg(test)]
mod testing;

pub use link::{PeerGone, SubscriberId, SubscriberLink};
pub use registry::{
    Channel, ChannelRegistry, ChannelState, ChannelStats, RegistryConfig, RegistryError,
};
pub use run::{RunId, RunSnapshot, RunStore, StoreError};
