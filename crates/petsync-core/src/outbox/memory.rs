//! In-memory outbox store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::OutboxStore;
use crate::error::{Error, Result};
use crate::models::{OutboxEntry, OutboxKey};

#[derive(Debug, Default)]
struct Inner {
    next_key: i64,
    entries: BTreeMap<OutboxKey, OutboxEntry>,
}

/// Outbox kept in process memory; keys are allocated in insertion order.
#[derive(Debug)]
pub struct MemoryOutboxStore {
    inner: Mutex<Inner>,
    available: AtomicBool,
}

impl Default for MemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_key: 1,
                entries: BTreeMap::new(),
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store becoming reachable or unreachable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn scan(&self) -> Result<Vec<(OutboxKey, OutboxEntry)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .map(|(key, entry)| (*key, entry.clone()))
            .collect())
    }

    async fn get(&self, key: OutboxKey) -> Result<Option<OutboxEntry>> {
        Ok(self.inner.lock().await.entries.get(&key).cloned())
    }

    async fn add(&self, entry: &OutboxEntry) -> Result<OutboxKey> {
        let mut inner = self.inner.lock().await;
        let key = OutboxKey(inner.next_key);
        inner.next_key += 1;
        inner.entries.insert(key, entry.clone());
        Ok(key)
    }

    async fn put(&self, key: OutboxKey, entry: &OutboxEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if key.0 >= inner.next_key {
            return Err(Error::Store(format!("unknown outbox key {key}")));
        }
        inner.entries.insert(key, entry.clone());
        Ok(())
    }

    async fn delete(&self, key: OutboxKey) -> Result<()> {
        self.inner.lock().await.entries.remove(&key);
        Ok(())
    }
}
