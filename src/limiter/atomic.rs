//! Fully-atomic limiter: strict global correctness.
//!
//! Every call performs a `get` and a conditional `update`, both
//! awaited, before returning. A lost condition is a business outcome
//! (deny with the collision flag), not an error; transport failures
//! propagate to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use super::RateLimiter;
use crate::bucket::{assess, sanitize, Decision};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{BucketWrite, CounterStore, StoreError};

pub struct AtomicLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    table: String,
}

impl AtomicLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, table: &str) -> Self {
        Self {
            store,
            clock,
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl RateLimiter for AtomicLimiter {
    async fn apply(&self, client_id: &str) -> Result<Decision> {
        let now = self.clock.now_ms();

        let raw = self.store.get(&self.table, client_id).await?;
        let observed_last_refill = raw.as_ref().and_then(|r| r.last_refill);
        let bucket = sanitize(&raw.unwrap_or_default(), now);
        let assessment = assess(&bucket, now);

        if !assessment.allowed {
            return Ok(assessment.decision(&bucket));
        }

        let write = BucketWrite::from_bucket(&bucket, assessment.new_tokens.floor() as u64, now);
        // An absent lastRefill satisfies the condition through the
        // attribute_not_exists branch.
        let expected = observed_last_refill.unwrap_or(bucket.last_refill);

        match self
            .store
            .update(&self.table, client_id, &write, Some(expected))
            .await
        {
            Ok(()) => Ok(assessment.decision(&bucket)),
            Err(StoreError::ConditionFailed) => {
                debug!(
                    client_id = %client_id,
                    "conditional write lost to a concurrent writer"
                );
                Ok(assessment.collision_decision(&bucket))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Retries collision denials with exponential backoff and jitter.
///
/// Wraps the fully-atomic limiter where strict enforcement is worth
/// the extra latency. Transport errors and genuine over-quota denials
/// are returned as-is.
pub struct RetryingLimiter<L> {
    inner: L,
    max_retries: u32,
    base_delay: Duration,
}

impl<L> RetryingLimiter<L> {
    pub fn new(inner: L) -> Self {
        Self::with_retry_policy(inner, 3, Duration::from_millis(25))
    }

    pub fn with_retry_policy(inner: L, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }
}

#[async_trait]
impl<L: RateLimiter> RateLimiter for RetryingLimiter<L> {
    async fn apply(&self, client_id: &str) -> Result<Decision> {
        let mut attempt = 0;
        loop {
            let decision = self.inner.apply(client_id).await?;
            if !decision.collision || attempt >= self.max_retries {
                return Ok(decision);
            }

            let backoff = self.base_delay * 2u32.saturating_pow(attempt);
            let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis().max(1) as u64 / 2);
            tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
            attempt += 1;
        }
    }
}
