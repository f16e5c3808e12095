//! Shared test doubles
//!
//! In-memory stand-ins for the two capabilities the core consumes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::link::{PeerGone, SubscriberLink};
use crate::run::{RunId, RunSnapshot, RunStore, StoreError};

/// Opt-in log output while debugging tests: `RUST_LOG=debug cargo test`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Subscriber link that records everything the core does to it
pub(crate) struct MockLink {
    pub accepted: AtomicUsize,
    sent: Mutex<Vec<String>>,
    closed: Mutex<Option<String>>,
    fail_accept: AtomicBool,
    fail_send: AtomicBool,
}

impl MockLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accepted: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
            fail_accept: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        })
    }

    pub fn failing_accept() -> Arc<Self> {
        let link = Self::new();
        link.fail_accept.store(true, Ordering::SeqCst);
        link
    }

    pub fn failing_send() -> Arc<Self> {
        let link = Self::new();
        link.fail_send.store(true, Ordering::SeqCst);
        link
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriberLink for MockLink {
    async fn accept(&self) -> Result<(), PeerGone> {
        if self.fail_accept.load(Ordering::SeqCst) {
            return Err(PeerGone);
        }
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), PeerGone> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(PeerGone);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self, reason: &str) -> Result<(), PeerGone> {
        *self.closed.lock().unwrap() = Some(reason.to_string());
        Ok(())
    }
}

/// In-memory run table standing in for the persistence collaborator
pub(crate) struct MockStore {
    runs: Mutex<HashMap<RunId, f64>>,
    pub lookups: AtomicUsize,
    pub updates: AtomicUsize,
    pub fail_backend: AtomicBool,
    update_delay: Mutex<Option<Duration>>,
}

impl MockStore {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail_backend: AtomicBool::new(false),
            update_delay: Mutex::new(None),
        })
    }

    pub fn with_run(id: RunId, value: f64) -> Arc<Self> {
        let store = Self::empty();
        store.runs.lock().unwrap().insert(id, value);
        store
    }

    pub fn delete(&self, id: RunId) {
        self.runs.lock().unwrap().remove(&id);
    }

    pub fn value(&self, id: RunId) -> Option<f64> {
        self.runs.lock().unwrap().get(&id).copied()
    }

    /// Make subsequent `update` calls stall, to open race windows on purpose
    pub fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl RunStore for MockStore {
    async fn lookup(&self, id: RunId) -> Result<RunSnapshot, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.fail_backend.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".into()));
        }

        match self.runs.lock().unwrap().get(&id) {
            Some(value) => Ok(RunSnapshot { id, value: *value }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn update(&self, id: RunId, value: f64) -> Result<RunSnapshot, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_backend.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".into()));
        }

        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(&id) {
            Some(stored) => {
                *stored = value;
                Ok(RunSnapshot { id, value })
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}
