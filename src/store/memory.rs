//! In-memory counter store used by tests and local runs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{BucketWrite, CounterStore, StoreError};
use crate::bucket::RawBucket;

/// A process-local store with the same conditional-write semantics as
/// the DynamoDB binding.
///
/// Exposes call counters and failure injection so limiter tests can
/// observe traffic and exercise transport-error paths.
#[derive(Default)]
pub struct MemoryCounterStore {
    items: DashMap<String, BucketWrite>,
    fail: RwLock<Option<String>>,
    gets: AtomicU64,
    updates: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(table: &str, client_id: &str) -> String {
        format!("{}/{}", table, client_id)
    }

    /// Make every subsequent call fail with a transport error.
    pub fn fail_with(&self, message: &str) {
        *self.fail.write() = Some(message.to_string());
    }

    /// Clear an injected failure.
    pub fn recover(&self) {
        *self.fail.write() = None;
    }

    /// Seed an item directly, bypassing the trait.
    pub fn insert(&self, table: &str, client_id: &str, write: BucketWrite) {
        self.items.insert(Self::key(table, client_id), write);
    }

    /// Read the stored item directly, bypassing the trait.
    pub fn stored(&self, table: &str, client_id: &str) -> Option<BucketWrite> {
        self.items.get(&Self::key(table, client_id)).map(|e| *e)
    }

    /// Number of `get` calls served (including failed ones).
    pub fn get_calls(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `update` calls served (including failed ones).
    pub fn update_calls(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, table: &str, client_id: &str) -> Result<Option<RawBucket>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail.read().clone() {
            return Err(StoreError::Transport(message));
        }

        Ok(self.items.get(&Self::key(table, client_id)).map(|item| RawBucket {
            tokens: Some(item.tokens as f64),
            last_refill: Some(item.last_refill),
            refill_rate: Some(item.refill_rate as f64),
            refill_interval: Some(item.refill_interval as f64),
            max_tokens: Some(item.max_tokens as f64),
        }))
    }

    async fn update(
        &self,
        table: &str,
        client_id: &str,
        write: &BucketWrite,
        expected_last_refill: Option<u64>,
    ) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail.read().clone() {
            return Err(StoreError::Transport(message));
        }

        match self.items.entry(Self::key(table, client_id)) {
            Entry::Occupied(mut occupied) => {
                if let Some(expected) = expected_last_refill {
                    if occupied.get().last_refill != expected {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                occupied.insert(*write);
            }
            // An absent item satisfies any condition.
            Entry::Vacant(vacant) => {
                vacant.insert(*write);
            }
        }
        Ok(())
    }
}
