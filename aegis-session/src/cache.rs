//! In-process session cache: LRU with a fixed TTL, backing identity
//! resolution path 1. A cache miss falls through to the durable
//! `SessionStore`; a cache hit is the fast path for session-key
//! continuity auth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    identity_id: Uuid,
    inserted_at: Instant,
}

/// A small LRU ring implemented as an ordered `Vec` of keys plus a map;
/// adequate at the cache sizes this service runs at (thousands of
/// concurrently bound sessions), and simpler to reason about than a
/// linked-hashmap dependency for a cache this small.
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: Vec<String>,
    capacity: usize,
    ttl: Duration,
}

impl Inner {
    fn touch_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push(key.to_string());
    }

    fn evict_if_over_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            if self.order.is_empty() {
                break;
            }
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

/// Thread-safe LRU+TTL session cache.
pub struct SessionCache {
    inner: Mutex<Inner>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                capacity,
                ttl,
            }),
        }
    }

    /// Look up a session key, returning the bound identity if present
    /// and not expired. Expired entries are evicted lazily on access.
    pub fn get(&self, session_key: &str) -> Option<Uuid> {
        let mut inner = self.inner.lock().expect("session cache mutex poisoned");
        let expired = match inner.entries.get(session_key) {
            Some(entry) => entry.inserted_at.elapsed() > inner.ttl,
            None => return None,
        };

        if expired {
            inner.entries.remove(session_key);
            if let Some(pos) = inner.order.iter().position(|k| k == session_key) {
                inner.order.remove(pos);
            }
            return None;
        }

        inner.touch_order(session_key);
        inner.entries.get(session_key).map(|e| e.identity_id)
    }

    pub fn insert(&self, session_key: String, identity_id: Uuid) {
        let mut inner = self.inner.lock().expect("session cache mutex poisoned");
        inner.entries.insert(
            session_key.clone(),
            CacheEntry {
                identity_id,
                inserted_at: Instant::now(),
            },
        );
        inner.touch_order(&session_key);
        inner.evict_if_over_capacity();
    }

    pub fn invalidate(&self, session_key: &str) {
        let mut inner = self.inner.lock().expect("session cache mutex poisoned");
        inner.entries.remove(session_key);
        if let Some(pos) = inner.order.iter().position(|k| k == session_key) {
            inner.order.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_then_miss_after_invalidate() {
        let cache = SessionCache::new();
        let id = Uuid::new_v4();
        cache.insert("sess-1".to_string(), id);
        assert_eq!(cache.get("sess-1"), Some(id));

        cache.invalidate("sess-1");
        assert_eq!(cache.get("sess-1"), None);
    }

    #[test]
    fn expires_after_ttl() {
        let cache = SessionCache::with_capacity_and_ttl(10, Duration::from_millis(10));
        let id = Uuid::new_v4();
        cache.insert("sess-1".to_string(), id);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("sess-1"), None);
    }

    #[test]
    fn evicts_least_recently_used_over_capacity() {
        let cache = SessionCache::with_capacity_and_ttl(2, DEFAULT_TTL);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        cache.insert("a".to_string(), a);
        cache.insert("b".to_string(), b);
        // touch "a" so "b" becomes the least recently used
        assert_eq!(cache.get("a"), Some(a));
        cache.insert("c".to_string(), c);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(a));
        assert_eq!(cache.get("c"), Some(c));
    }
}
