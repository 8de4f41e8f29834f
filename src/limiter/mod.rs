//! Rate limiter variants and per-request selection.

mod atomic;
mod cache;
mod hybrid_v1;
mod hybrid_v2;

pub use atomic::{AtomicLimiter, RetryingLimiter};
pub use cache::{CachedBucket, TokenBucketCache};
pub use hybrid_v1::HybridV1Limiter;
pub use hybrid_v2::HybridV2Limiter;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bucket::Decision;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::CounterStore;

/// A rate limiter applies the token bucket to one client and produces
/// a decision.
///
/// This trait abstracts over the three consistency profiles so the
/// orchestrator can work with any of them.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn apply(&self, client_id: &str) -> Result<Decision>;
}

/// Wire names of the selectable limiter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimiterKey {
    /// Optimistic fire-and-forget.
    #[serde(rename = "reduced-atomicity-hybrid-v1")]
    HybridV1,
    /// Partially-atomic hybrid with conditional background writes.
    #[serde(rename = "reduced-atomicity-hybrid-v2")]
    HybridV2,
    /// Fully-atomic synchronous.
    #[serde(rename = "fully-atomic-dynamo")]
    FullyAtomic,
}

impl LimiterKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKey::HybridV1 => "reduced-atomicity-hybrid-v1",
            LimiterKey::HybridV2 => "reduced-atomicity-hybrid-v2",
            LimiterKey::FullyAtomic => "fully-atomic-dynamo",
        }
    }

    /// Parse a wire name, `None` for anything unknown.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reduced-atomicity-hybrid-v1" => Some(LimiterKey::HybridV1),
            "reduced-atomicity-hybrid-v2" => Some(LimiterKey::HybridV2),
            "fully-atomic-dynamo" => Some(LimiterKey::FullyAtomic),
            _ => None,
        }
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup table of constructed limiters plus the configured default.
pub struct LimiterRegistry {
    hybrid_v1: Arc<dyn RateLimiter>,
    hybrid_v2: Arc<dyn RateLimiter>,
    fully_atomic: Arc<dyn RateLimiter>,
    default_key: LimiterKey,
    header_selectable: bool,
}

impl LimiterRegistry {
    /// Build the standard three-variant registry over one store and
    /// clock.
    pub fn standard(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        table: &str,
        default_key: LimiterKey,
        header_selectable: bool,
    ) -> Self {
        Self::new(
            Arc::new(HybridV1Limiter::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                table,
            )),
            Arc::new(HybridV2Limiter::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                table,
            )),
            Arc::new(AtomicLimiter::new(store, clock, table)),
            default_key,
            header_selectable,
        )
    }

    /// Assemble a registry from pre-built limiters.
    pub fn new(
        hybrid_v1: Arc<dyn RateLimiter>,
        hybrid_v2: Arc<dyn RateLimiter>,
        fully_atomic: Arc<dyn RateLimiter>,
        default_key: LimiterKey,
        header_selectable: bool,
    ) -> Self {
        Self {
            hybrid_v1,
            hybrid_v2,
            fully_atomic,
            default_key,
            header_selectable,
        }
    }

    pub fn limiter(&self, key: LimiterKey) -> &Arc<dyn RateLimiter> {
        match key {
            LimiterKey::HybridV1 => &self.hybrid_v1,
            LimiterKey::HybridV2 => &self.hybrid_v2,
            LimiterKey::FullyAtomic => &self.fully_atomic,
        }
    }

    /// Resolve the limiter for a request.
    ///
    /// The selection header is honored only when header selection is
    /// enabled; unknown or malformed values fall back silently to the
    /// configured default.
    pub fn select(&self, header: Option<&str>) -> (LimiterKey, Arc<dyn RateLimiter>) {
        let key = if self.header_selectable {
            header.and_then(LimiterKey::parse).unwrap_or(self.default_key)
        } else {
            self.default_key
        };
        (key, Arc::clone(self.limiter(key)))
    }
}
