//! Subscriber link capability
//!
//! The transport (WebSocket, TCP, in-process queue) lives with the embedder;
//! the core drives it through [`SubscriberLink`] and treats every link-level
//! failure the same way: the peer is gone, drop it, keep serving the rest.

use async_trait::async_trait;

/// Process-unique identifier for an attached subscriber
///
/// Allocated by the registry when a link is attached; callers hand it back
/// to disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for link operations
///
/// Carries no detail on purpose: whatever went wrong at the transport, the
/// core reacts identically, so the reason stays with the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerGone;

impl std::fmt::Display for PeerGone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer is gone")
    }
}

impl std::error::Error for PeerGone {}

/// Bidirectional subscriber connection as seen by the core
#[async_trait]
pub trait SubscriberLink: Send + Sync {
    /// Complete the handshake; called once, before the link joins a channel
    async fn accept(&self) -> Result<(), PeerGone>;

    /// Deliver one text frame to the peer
    async fn send_text(&self, text: &str) -> Result<(), PeerGone>;

    /// Close the link, telling the peer why
    async fn close(&self, reason: &str) -> Result<(), PeerGone>;
}
