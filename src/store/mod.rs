//! Remote counter store: the conditional key-value seam shared by all
//! limiter variants.

mod dynamo;
mod memory;

pub use dynamo::DynamoCounterStore;
pub use memory::MemoryCounterStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::bucket::{Bucket, RawBucket};

/// Errors from counter store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The conditional update predicate did not hold. A business
    /// outcome, not a transport failure.
    #[error("conditional update failed")]
    ConditionFailed,

    /// The call did not complete within the configured deadline.
    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    /// Any other transport or service failure.
    #[error("store transport error: {0}")]
    Transport(String),
}

/// The five persisted bucket attributes, floored for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWrite {
    pub tokens: u64,
    pub last_refill: u64,
    pub refill_rate: u64,
    pub refill_interval: u64,
    pub max_tokens: u64,
}

impl BucketWrite {
    /// Snapshot a sanitized bucket for persistence with the given
    /// floored count and refill time.
    pub fn from_bucket(bucket: &Bucket, tokens: u64, last_refill: u64) -> Self {
        Self {
            tokens,
            last_refill,
            refill_rate: bucket.refill_rate,
            refill_interval: bucket.refill_interval,
            max_tokens: bucket.max_tokens,
        }
    }
}

/// A conditional key-value store holding one bucket item per client.
///
/// `update` with `expected_last_refill = None` writes unconditionally.
/// With `Some(v)` the write succeeds only when the stored `lastRefill`
/// attribute is absent or equals `v`; otherwise it fails with
/// [`StoreError::ConditionFailed`].
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the raw item for a client, `None` when the client has
    /// never been seen.
    async fn get(&self, table: &str, client_id: &str) -> Result<Option<RawBucket>, StoreError>;

    /// Write all five bucket attributes, optionally guarded on the
    /// previously-observed refill time.
    async fn update(
        &self,
        table: &str,
        client_id: &str,
        write: &BucketWrite,
        expected_last_refill: Option<u64>,
    ) -> Result<(), StoreError>;
}
