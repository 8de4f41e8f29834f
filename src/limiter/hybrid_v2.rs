//! Hybrid partially-atomic limiter.
//!
//! Low latency with bounded over-issuance. Decisions are made against
//! the process cache and persisted by a conditional background sync
//! that self-heals on conflict: a lost write refreshes the cache from
//! the store and retries once against the refreshed state. The
//! foreground decision is never revised; in-flight overages are the
//! accepted cost of the optimistic path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::cache::TokenBucketCache;
use super::RateLimiter;
use crate::bucket::{assess, sanitize, Bucket, Decision};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{BucketWrite, CounterStore, StoreError};

/// How long a cache entry stays authoritative before the store is
/// consulted again. Wider than V1: the conditional sync heals the
/// divergence this buys, and the wider window cuts read traffic.
const STALENESS_MS: u64 = 15_000;

/// Collision retries per background sync.
const SYNC_RETRIES: u32 = 1;

pub struct HybridV2Limiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    table: String,
    cache: Arc<TokenBucketCache>,
}

impl HybridV2Limiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, table: &str) -> Self {
        Self {
            store,
            clock,
            table: table.to_string(),
            cache: Arc::new(TokenBucketCache::new(STALENESS_MS)),
        }
    }

    fn spawn_sync(&self, client_id: &str, snapshot: Bucket, consumed: bool, now: u64) {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let table = self.table.clone();
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            sync_to_store(store, cache, table, client_id, snapshot, consumed, now).await;
        });
    }
}

#[async_trait]
impl RateLimiter for HybridV2Limiter {
    async fn apply(&self, client_id: &str) -> Result<Decision> {
        let now = self.clock.now_ms();

        let seed = if self.cache.is_fresh(client_id, now) {
            None
        } else {
            match self.store.get(&self.table, client_id).await {
                Ok(raw) => Some(sanitize(&raw.unwrap_or_default(), now)),
                Err(error) => {
                    warn!(
                        client_id = %client_id,
                        error = %error,
                        "bucket fetch failed, denying"
                    );
                    return Ok(Decision::fail_closed());
                }
            }
        };

        let (decision, sync) = self.cache.with_bucket(client_id, seed, now, |entry| {
            let snapshot = entry.bucket.clone();
            let assessment = assess(&entry.bucket, now);
            let decision = assessment.decision(&entry.bucket);

            if assessment.allowed {
                // Fractional count stays in cache; floored on persist.
                entry.bucket.tokens = assessment.new_tokens;
                entry.bucket.last_refill = now;
                entry.last_access = now;
                (decision, Some((snapshot, true)))
            } else if assessment.capped > snapshot.tokens {
                // Denied, but the elapsed time produced a refill worth
                // persisting.
                entry.bucket.tokens = assessment.capped;
                entry.bucket.last_refill = now;
                (decision, Some((snapshot, false)))
            } else {
                (decision, None)
            }
        });

        if let Some((snapshot, consumed)) = sync {
            self.spawn_sync(client_id, snapshot, consumed, now);
        }

        Ok(decision)
    }
}

/// Persist a decision's effect.
///
/// The write is guarded on the pre-consumption snapshot's refill time.
/// On a lost condition the cache adopts the stored state and the write
/// is recomputed against it once; further failures are logged and
/// dropped.
async fn sync_to_store(
    store: Arc<dyn CounterStore>,
    cache: Arc<TokenBucketCache>,
    table: String,
    client_id: String,
    mut snapshot: Bucket,
    consumed: bool,
    now: u64,
) {
    let mut retries_left = SYNC_RETRIES;
    loop {
        let assessment = assess(&snapshot, now);
        let after = if consumed {
            (assessment.capped - 1.0).max(0.0)
        } else {
            assessment.capped
        };
        let write = BucketWrite::from_bucket(&snapshot, after.floor() as u64, now);

        match store
            .update(&table, &client_id, &write, Some(snapshot.last_refill))
            .await
        {
            Ok(()) => return,
            Err(StoreError::ConditionFailed) => {
                // Lost to a concurrent writer: adopt the stored state.
                match store.get(&table, &client_id).await {
                    Ok(raw) => {
                        let refreshed = sanitize(&raw.unwrap_or_default(), now);
                        cache.put(&client_id, refreshed.clone(), now);
                        if retries_left == 0 {
                            warn!(
                                client_id = %client_id,
                                "counter sync abandoned after collision retry"
                            );
                            return;
                        }
                        retries_left -= 1;
                        snapshot = refreshed;
                    }
                    Err(error) => {
                        warn!(
                            client_id = %client_id,
                            error = %error,
                            "cache refresh after collision failed"
                        );
                        return;
                    }
                }
            }
            Err(error) => {
                warn!(
                    client_id = %client_id,
                    error = %error,
                    "background counter sync failed"
                );
                return;
            }
        }
    }
}
