//! Token bucket state: sanitization and the shared refill/consume math.

mod sanitize;
mod state;

pub use sanitize::{
    sanitize, Bucket, RawBucket, DEFAULT_MAX_TOKENS, DEFAULT_REFILL_INTERVAL_SECS,
    DEFAULT_REFILL_RATE, HARD_MAX_REFILL_RATE, HARD_MAX_TOKENS,
};
pub use state::{assess, reset_seconds, Assessment, Decision};
