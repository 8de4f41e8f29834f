//! Shared token bucket math: refill, cap, consume, reset accounting.
//!
//! All three limiter variants run exactly this computation; they differ
//! only in where it executes and how the new state is persisted.

use super::sanitize::{
    Bucket, DEFAULT_MAX_TOKENS, DEFAULT_REFILL_INTERVAL_SECS, DEFAULT_REFILL_RATE,
};

/// The outcome of a rate-limit check, as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// The bucket capacity (`X-RateLimit-Limit`).
    pub limit: u64,
    /// Whole tokens left: post-consumption on allow, pre-consumption on
    /// deny.
    pub remaining: u64,
    /// Seconds until the bucket refills completely; 0 when already full.
    pub reset: u64,
    /// Whether a conditional write lost to a concurrent writer.
    pub collision: bool,
}

impl Decision {
    /// The deny issued when the counter store cannot be consulted.
    ///
    /// Reports the default limits since the client's real configuration
    /// is unreachable.
    pub fn fail_closed() -> Self {
        Self {
            allowed: false,
            limit: DEFAULT_MAX_TOKENS,
            remaining: 0,
            reset: reset_seconds(
                0,
                DEFAULT_MAX_TOKENS,
                DEFAULT_REFILL_INTERVAL_SECS,
                DEFAULT_REFILL_RATE,
            ),
            collision: false,
        }
    }
}

/// One application of the bucket math to a sanitized bucket at a point
/// in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub allowed: bool,
    /// Token count after refill and cap, before consumption.
    pub capped: f64,
    /// Token count after consumption; equals `capped` on deny.
    pub new_tokens: f64,
    /// Whole tokens to report: `floor(new_tokens)` on allow,
    /// `floor(capped)` on deny.
    pub remaining: u64,
    /// Seconds until full from `remaining`.
    pub reset: u64,
}

impl Assessment {
    /// Decision view of this assessment.
    pub fn decision(&self, bucket: &Bucket) -> Decision {
        Decision {
            allowed: self.allowed,
            limit: bucket.max_tokens,
            remaining: self.remaining,
            reset: self.reset,
            collision: false,
        }
    }

    /// Deny carrying the pre-consumption count, issued when a
    /// conditional write loses to a concurrent writer.
    pub fn collision_decision(&self, bucket: &Bucket) -> Decision {
        let remaining = self.capped.floor() as u64;
        Decision {
            allowed: false,
            limit: bucket.max_tokens,
            remaining,
            reset: reset_seconds(
                remaining,
                bucket.max_tokens,
                bucket.refill_interval,
                bucket.refill_rate,
            ),
            collision: true,
        }
    }
}

/// Refill a bucket up to `now_ms`, cap it, and consume one token if a
/// whole token is available.
pub fn assess(bucket: &Bucket, now_ms: u64) -> Assessment {
    let time_delta = now_ms.saturating_sub(bucket.last_refill);
    let refill = bucket.refill_rate as f64 * time_delta as f64
        / (bucket.refill_interval as f64 * 1000.0);
    let capped = (bucket.tokens + refill).min(bucket.max_tokens as f64);

    let allowed = capped.floor() >= 1.0;
    let new_tokens = if allowed { capped - 1.0 } else { capped };
    let remaining = new_tokens.floor().max(0.0) as u64;

    Assessment {
        allowed,
        capped,
        new_tokens,
        remaining,
        reset: reset_seconds(
            remaining,
            bucket.max_tokens,
            bucket.refill_interval,
            bucket.refill_rate,
        ),
    }
}

/// Seconds until a bucket holding `remaining` whole tokens refills to
/// `max_tokens` at the given rate; 0 when already full.
pub fn reset_seconds(remaining: u64, max_tokens: u64, refill_interval: u64, refill_rate: u64) -> u64 {
    if remaining >= max_tokens {
        return 0;
    }
    let deficit = (max_tokens - remaining) as f64;
    (deficit * refill_interval as f64 / refill_rate as f64).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::sanitize::{sanitize, RawBucket};
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000_000;

    fn bucket(tokens: f64, last_refill: u64, rate: u64, interval: u64, max: u64) -> Bucket {
        Bucket {
            tokens,
            last_refill,
            refill_rate: rate,
            refill_interval: interval,
            max_tokens: max,
        }
    }

    #[test]
    fn test_full_new_bucket_allows_and_decrements() {
        let b = sanitize(&RawBucket::default(), NOW);
        let a = assess(&b, NOW);

        assert!(a.allowed);
        assert_eq!(a.remaining, 499);
        assert_eq!(a.reset, 1);
    }

    #[test]
    fn test_depleted_bucket_denies_without_refill() {
        let b = bucket(0.0, NOW, 300, 60, 500);
        let a = assess(&b, NOW);

        assert!(!a.allowed);
        assert_eq!(a.remaining, 0);
        assert_eq!(a.reset, 100);
        assert_eq!(a.new_tokens, a.capped);
    }

    #[test]
    fn test_partial_refill() {
        let b = bucket(0.0, NOW - 30_000, 750, 60, 750);
        let a = assess(&b, NOW);

        assert!(a.allowed);
        assert_eq!(a.remaining, 374);
        assert_eq!(a.reset, 31);
    }

    #[test]
    fn test_last_token_then_deny() {
        let b = bucket(1.0, NOW, 300, 60, 500);
        let a = assess(&b, NOW);
        assert!(a.allowed);
        assert_eq!(a.remaining, 0);

        let drained = bucket(a.new_tokens, NOW, 300, 60, 500);
        let next = assess(&drained, NOW);
        assert!(!next.allowed);
        assert_eq!(next.remaining, 0);
    }

    #[test]
    fn test_fractional_tokens_below_one_deny() {
        let b = bucket(0.9, NOW, 300, 60, 500);
        let a = assess(&b, NOW);
        assert!(!a.allowed);
        assert_eq!(a.remaining, 0);
    }

    #[test]
    fn test_single_token_needs_full_interval_at_rate_one() {
        let b = bucket(0.0, NOW, 1, 60, 500);

        // One interval minus a millisecond: still below a whole token.
        let a = assess(&b, NOW + 59_999);
        assert!(!a.allowed);

        let a = assess(&b, NOW + 60_000);
        assert!(a.allowed);
    }

    #[test]
    fn test_long_idle_refills_to_capacity_only() {
        let b = bucket(0.0, NOW - 86_400_000, 300, 60, 500);
        let a = assess(&b, NOW);

        assert_eq!(a.capped, 500.0);
        assert!(a.allowed);
        assert_eq!(a.remaining, 499);
    }

    #[test]
    fn test_future_last_refill_adds_nothing() {
        let b = bucket(3.0, NOW + 60_000, 300, 60, 500);
        let a = assess(&b, NOW);
        assert_eq!(a.capped, 3.0);
    }

    #[test]
    fn test_fractionally_consumed_bucket_never_reports_full() {
        // Nominally full but strictly below capacity after fractional
        // consumption: reset must stay nonzero.
        let b = bucket(499.999, NOW, 300, 60, 500);
        let a = assess(&b, NOW);

        assert!(a.allowed);
        assert_eq!(a.remaining, 498);
        assert!(a.reset > 0);
    }

    proptest! {
        #[test]
        fn reset_is_zero_iff_full(
            remaining in 0u64..6_000,
            max_tokens in 1u64..2_500,
            refill_interval in 1u64..3_600,
            refill_rate in 1u64..2_500,
        ) {
            let reset = reset_seconds(remaining, max_tokens, refill_interval, refill_rate);
            prop_assert_eq!(reset == 0, remaining >= max_tokens);
        }

        #[test]
        fn refill_is_monotone_in_time(
            tokens in 0.0f64..2_500.0,
            rate in 1u64..2_500,
            interval in 1u64..3_600,
            max in 1u64..2_500,
            earlier in 0u64..10_000_000,
            extra in 0u64..10_000_000,
        ) {
            let tokens = tokens.min(max as f64);
            let b = bucket(tokens, NOW, rate, interval, max);
            let first = assess(&b, NOW + earlier);
            let second = assess(&b, NOW + earlier + extra);
            prop_assert!(second.capped >= first.capped);
            prop_assert!(second.capped <= max as f64);
        }

        #[test]
        fn allowed_consumes_exactly_one(
            tokens in 0.0f64..2_500.0,
            rate in 1u64..2_500,
            interval in 1u64..3_600,
            max in 1u64..2_500,
            delta in 0u64..10_000_000,
        ) {
            let tokens = tokens.min(max as f64);
            let b = bucket(tokens, NOW, rate, interval, max);
            let a = assess(&b, NOW + delta);

            prop_assert_eq!(a.allowed, a.capped.floor() >= 1.0);
            if a.allowed {
                prop_assert!((a.capped - a.new_tokens - 1.0).abs() < 1e-9);
            } else {
                prop_assert_eq!(a.new_tokens, a.capped);
            }
            prop_assert!(a.new_tokens >= 0.0 || !a.allowed);
            prop_assert!(a.remaining <= max);
        }
    }
}
