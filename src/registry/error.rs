//! Registry error types
//!
//! Error types for subscription operations.

use crate::run::{RunId, StoreError};

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// No simulation run exists under this id; nothing was created
    RunNotFound(RunId),
    /// The subscriber vanished during the attach handshake
    PeerGone,
    /// The run store could not be queried at connect time
    Store(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::RunNotFound(id) => write!(f, "Simulation run not found: {}", id),
            RegistryError::PeerGone => write!(f, "Subscriber gone before attach"),
            RegistryError::Store(msg) => write!(f, "Run store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RegistryError::RunNotFound(id),
            StoreError::Backend(msg) => RegistryError::Store(msg),
        }
    }
}
