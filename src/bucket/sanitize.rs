//! Bucket sanitization: per-field defaults, minima, and hard caps.
//!
//! Sanitization is total. Whatever shape a stored item is in (missing
//! fields, non-numeric garbage parsed away upstream, out-of-range
//! values), the result is a usable bucket; clamping never fails.

/// Default tokens added per refill interval.
pub const DEFAULT_REFILL_RATE: u64 = 300;
/// Default refill interval in seconds.
pub const DEFAULT_REFILL_INTERVAL_SECS: u64 = 60;
/// Default bucket capacity.
pub const DEFAULT_MAX_TOKENS: u64 = 500;
/// Hard cap on bucket capacity, regardless of stored configuration.
pub const HARD_MAX_TOKENS: u64 = 2500;
/// Hard cap on refill rate, regardless of stored configuration.
pub const HARD_MAX_REFILL_RATE: u64 = 2500;

/// A bucket item as read from the counter store.
///
/// Every field may be absent: new clients have no item at all, and
/// existing items may carry unparseable attributes (surfaced as `None`
/// by the store binding).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBucket {
    pub tokens: Option<f64>,
    /// Milliseconds since the Unix epoch of the last refill.
    pub last_refill: Option<u64>,
    pub refill_rate: Option<f64>,
    /// Refill interval in seconds.
    pub refill_interval: Option<f64>,
    pub max_tokens: Option<f64>,
}

/// A sanitized bucket. All fields are in range.
///
/// `tokens` stays fractional to carry sub-integer refill credit between
/// calls; it is floored only for reporting and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub tokens: f64,
    /// Milliseconds since the Unix epoch of the last refill.
    pub last_refill: u64,
    /// Tokens added per `refill_interval`.
    pub refill_rate: u64,
    /// Refill interval in seconds.
    pub refill_interval: u64,
    pub max_tokens: u64,
}

impl Bucket {
    /// The full default bucket a previously-unseen client starts with.
    pub fn full_default(now_ms: u64) -> Self {
        sanitize(&RawBucket::default(), now_ms)
    }
}

/// Clamp a stored numeric field into `[1, max]`, falling back to the
/// default when it is absent or not a finite number.
fn clamp_field(raw: Option<f64>, default: u64, max: u64) -> u64 {
    match raw {
        Some(v) if v.is_finite() => (v.floor() as i64).clamp(1, max as i64) as u64,
        _ => default,
    }
}

/// Apply defaults, minima, and hard caps to a raw item.
///
/// An absent item (`RawBucket::default()`) sanitizes to a full bucket
/// with `last_refill = now_ms`.
pub fn sanitize(raw: &RawBucket, now_ms: u64) -> Bucket {
    let max_tokens = clamp_field(raw.max_tokens, DEFAULT_MAX_TOKENS, HARD_MAX_TOKENS);
    let refill_rate = clamp_field(raw.refill_rate, DEFAULT_REFILL_RATE, HARD_MAX_REFILL_RATE);
    let refill_interval = match raw.refill_interval {
        Some(v) if v.is_finite() => (v.floor() as i64).max(1) as u64,
        _ => DEFAULT_REFILL_INTERVAL_SECS,
    };

    // A missing count means a new client: start full.
    let tokens = match raw.tokens {
        Some(v) if v.is_finite() => v.clamp(0.0, max_tokens as f64),
        _ => max_tokens as f64,
    };

    Bucket {
        tokens,
        last_refill: raw.last_refill.unwrap_or(now_ms),
        refill_rate,
        refill_interval,
        max_tokens,
    }
}
