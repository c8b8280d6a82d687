//! String-keyed cache with per-entry expiry.
//!
//! Callers treat the cache as an optimisation only. [`NoopCache`] always
//! misses and is the fallback when no cache is configured.

use std::time::{Duration, Instant};

use moka::sync::Cache as MokaInner;
use moka::Expiry;

/// Get / set-with-expiry keyed by string.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl: Duration);

    fn invalidate(&self, key: &str);
}

/// A cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String, _ttl: Duration) {}

    fn invalidate(&self, _key: &str) {}
}

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka, honouring the TTL given on each `set`.
#[derive(Clone)]
pub struct MokaCache {
    inner: MokaInner<String, Entry>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = MokaInner::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { inner }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Cache for MokaCache {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|e| e.value)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl });
    }

    fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }
}
