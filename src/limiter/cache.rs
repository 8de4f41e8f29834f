//! Process-local bucket cache shared by the hybrid limiters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::bucket::Bucket;

/// A sanitized bucket plus its last-touch time.
///
/// `tokens` stays fractional in cache so sub-integer refill credit
/// survives rapid bursts; it is floored only on report and persist.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBucket {
    pub bucket: Bucket,
    /// Milliseconds since the epoch of the last refresh or consume.
    pub last_access: u64,
}

/// Per-process bucket cache keyed by client id.
///
/// Entry guards serialize read-modify-write per client. Callers must
/// not hold a guard across an await point; the refresh fetch happens
/// outside and is handed in as a seed.
pub struct TokenBucketCache {
    entries: DashMap<String, CachedBucket>,
    staleness_ms: u64,
}

impl TokenBucketCache {
    pub fn new(staleness_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            staleness_ms,
        }
    }

    /// Whether the entry exists and was touched within the staleness
    /// window.
    pub fn is_fresh(&self, client_id: &str, now_ms: u64) -> bool {
        self.entries
            .get(client_id)
            .map(|entry| now_ms.saturating_sub(entry.last_access) <= self.staleness_ms)
            .unwrap_or(false)
    }

    /// Overwrite the entry with freshly-fetched store state.
    pub fn put(&self, client_id: &str, bucket: Bucket, now_ms: u64) {
        self.entries.insert(
            client_id.to_string(),
            CachedBucket {
                bucket,
                last_access: now_ms,
            },
        );
    }

    /// Run `f` against the client's entry under its shard lock.
    ///
    /// A `seed` (the result of a store refresh) replaces whatever is
    /// cached and counts as a touch; without one, a missing entry
    /// starts as the full default bucket.
    pub fn with_bucket<R>(
        &self,
        client_id: &str,
        seed: Option<Bucket>,
        now_ms: u64,
        f: impl FnOnce(&mut CachedBucket) -> R,
    ) -> R {
        match self.entries.entry(client_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if let Some(bucket) = seed {
                    entry.bucket = bucket;
                    entry.last_access = now_ms;
                }
                f(entry)
            }
            Entry::Vacant(vacant) => {
                let mut guard = vacant.insert(CachedBucket {
                    bucket: seed.unwrap_or_else(|| Bucket::full_default(now_ms)),
                    last_access: now_ms,
                });
                f(guard.value_mut())
            }
        }
    }

    /// Snapshot an entry, fresh or not.
    pub fn snapshot(&self, client_id: &str) -> Option<CachedBucket> {
        self.entries.get(client_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
