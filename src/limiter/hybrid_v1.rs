//! Optimistic fire-and-forget limiter.
//!
//! Minimum added latency; correctness is best-effort per process.
//! Writes are unconditional and unawaited, so concurrent writers from
//! different processes clobber each other (last write wins) and brief
//! overages are possible. Deliberate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::cache::TokenBucketCache;
use super::RateLimiter;
use crate::bucket::{assess, sanitize, Decision};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{BucketWrite, CounterStore};

/// How long a cache entry stays authoritative before the store is
/// consulted again.
const STALENESS_MS: u64 = 1_000;

pub struct HybridV1Limiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    table: String,
    cache: TokenBucketCache,
}

impl HybridV1Limiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, table: &str) -> Self {
        Self {
            store,
            clock,
            table: table.to_string(),
            cache: TokenBucketCache::new(STALENESS_MS),
        }
    }
}

#[async_trait]
impl RateLimiter for HybridV1Limiter {
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

        let (decision, write) = self.cache.with_bucket(client_id, seed, now, |entry| {
            let assessment = assess(&entry.bucket, now);
            let decision = assessment.decision(&entry.bucket);
            if !assessment.allowed {
                return (decision, None);
            }

            // Whole-token accounting: fractional refill credit is not
            // carried between calls.
            let remaining = assessment.new_tokens.floor().max(0.0);
            entry.bucket.tokens = remaining;
            entry.bucket.last_refill = now;
            entry.last_access = now;

            let write = BucketWrite::from_bucket(&entry.bucket, remaining as u64, now);
            (decision, Some(write))
        });

        if let Some(write) = write {
            let store = Arc::clone(&self.store);
            let table = self.table.clone();
            let client_id = client_id.to_string();
            // The return value does not await the write.
            tokio::spawn(async move {
                if let Err(error) = store.update(&table, &client_id, &write, None).await {
                    warn!(
                        client_id = %client_id,
                        error = %error,
                        "fire-and-forget counter write failed"
                    );
                }
            });
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryCounterStore;
    use std::time::Duration;

    const TABLE: &str = "rate-limiter";
    const NOW: u64 = 1_700_000_000_000;

    fn setup() -> (Arc<MemoryCounterStore>, Arc<ManualClock>, HybridV1Limiter) {
        let store = Arc::new(MemoryCounterStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let limiter = HybridV1Limiter::new(
            Arc::clone(&store) as Arc<dyn CounterStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            TABLE,
        );
        (store, clock, limiter)
    }

    async fn drain_background() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_new_client_burst_and_background_write() {
        let (store, _clock, limiter) = setup();

        let decision = limiter.apply("client-a").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 500);
        assert_eq!(decision.remaining, 499);

        drain_background().await;
        let stored = store.stored(TABLE, "client-a").unwrap();
        assert_eq!(stored.tokens, 499);
        assert_eq!(stored.last_refill, NOW);
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_reuse_within_staleness_window() {
        let (store, clock, limiter) = setup();

        let first = limiter.apply("client-a").await.unwrap();
        clock.advance(50);
        let second = limiter.apply("client-a").await.unwrap();

        assert_eq!(store.get_calls(), 1);
        assert_eq!(second.remaining, first.remaining - 1);
    }

    #[tokio::test]
    async fn test_stale_cache_refreshes_from_store() {
        let (store, clock, limiter) = setup();

        limiter.apply("client-a").await.unwrap();
        clock.advance(STALENESS_MS + 1);
        limiter.apply("client-a").await.unwrap();

        assert_eq!(store.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_deny_writes_nothing() {
        let (store, _clock, limiter) = setup();
        store.insert(
            TABLE,
            "client-a",
            BucketWrite {
                tokens: 0,
                last_refill: NOW,
                refill_rate: 300,
                refill_interval: 60,
                max_tokens: 500,
            },
        );

        let decision = limiter.apply("client-a").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        drain_background().await;
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_denies_fail_closed() {
        let (store, _clock, limiter) = setup();
        store.fail_with("socket closed");

        let decision = limiter.apply("client-a").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 500);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_integer_accounting_drops_fractional_credit() {
        let (store, clock, limiter) = setup();
        store.insert(
            TABLE,
            "client-a",
            BucketWrite {
                tokens: 5,
                last_refill: NOW,
                refill_rate: 300,
                refill_interval: 60,
                max_tokens: 500,
            },
        );

        limiter.apply("client-a").await.unwrap();
        // 100 ms refills 0.5 of a token; V1 truncates it on consume.
        clock.advance(100);
        limiter.apply("client-a").await.unwrap();

        let cached = limiter.cache.snapshot("client-a").unwrap();
        assert_eq!(cached.bucket.tokens, 3.0);
    }
}
