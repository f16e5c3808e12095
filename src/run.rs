//! Simulation run identity and persistence capability
//!
//! The core never owns run records. It references them by [`RunId`] and
//! reads/updates them through [`RunStore`], implemented by the embedding
//! application (database table, in-memory map, remote service).

use async_trait::async_trait;

/// Identifier of an externally-persisted simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub i64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RunId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The slice of a persisted run record the broadcast core needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSnapshot {
    /// Run identifier
    pub id: RunId,
    /// Current progress value
    pub value: f64,
}

/// Error type for run store operations
#[derive(Debug, Clone)]
pub enum StoreError {
    /// No run is persisted under this id
    NotFound(RunId),
    /// The backing store could not be reached
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Simulation run not found: {}", id),
            StoreError::Backend(msg) => write!(f, "Run store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Read/update capability over persisted simulation runs
///
/// `update` persists a new progress value and returns the stored record, or
/// reports that the run has been deleted in the meantime.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Fetch the current record for `id`
    async fn lookup(&self, id: RunId) -> Result<RunSnapshot, StoreError>;

    /// Persist `value` for `id` and return the stored record
    async fn update(&self, id: RunId, value: f64) -> Result<RunSnapshot, StoreError>;
}
