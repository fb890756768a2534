//! Mock implementations for testing
//!
//! `MemoryRecordStore` mirrors the idempotent insert semantics of the real
//! store, `FlakyEventSink` scripts publish failures for retry tests, and
//! `StaticProbe` pins health answers for the HTTP surface.

use crate::db::{PersistenceError, RecordStore};
use crate::events::{EventSink, PublishError};
use crate::health::HealthProbe;
use crate::protocol::{VitalsRecord, VitalsRecordedEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory record store with insert-if-absent semantics
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<HashMap<Uuid, VitalsRecord>>>,
    pub should_fail: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn count(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn get(&self, id: Uuid) -> Option<VitalsRecord> {
        self.records.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &VitalsRecord) -> Result<(), PersistenceError> {
        if self.should_fail {
            return Err(PersistenceError::Insert(sqlx::Error::Protocol(
                "Mock insert failure".to_string(),
            )));
        }

        let mut records = self.records.lock().await;
        // Duplicate ids are silently kept as the first write, matching
        // ON CONFLICT DO NOTHING
        records.entry(record.id).or_insert_with(|| record.clone());
        Ok(())
    }
}

/// Event sink that fails a scripted number of publishes before succeeding
#[derive(Debug, Default)]
pub struct FlakyEventSink {
    failures_remaining: AtomicU32,
    always_fail: bool,
    attempts: AtomicU32,
    next_sequence: AtomicU64,
    published: Arc<Mutex<Vec<VitalsRecordedEvent>>>,
}

impl FlakyEventSink {
    /// Sink that succeeds on every publish
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that fails the first `failures` publishes, then succeeds
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    /// Sink that never succeeds
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }

    /// Total publish calls observed, including failed ones
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<VitalsRecordedEvent> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for FlakyEventSink {
    async fn publish(&self, event: &VitalsRecordedEvent) -> Result<u64, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.always_fail {
            return Err(PublishError::Publish(
                "Mock publish failure".to_string().into(),
            ));
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(PublishError::Publish(
                "Mock publish failure".to_string().into(),
            ));
        }

        self.published.lock().await.push(event.clone());
        Ok(self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Health probe with pinned, mutable answers
#[derive(Debug)]
pub struct StaticProbe {
    healthy: AtomicBool,
    connected: AtomicBool,
}

impl StaticProbe {
    pub fn new(healthy: bool, connected: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
