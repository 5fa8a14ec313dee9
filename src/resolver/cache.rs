use super::Identity;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Bounded identity cache with least-recently-used eviction.
///
/// Both `get` and `insert` refresh an entry's recency. The map never grows
/// past its capacity; inserting a new key at capacity evicts the entry with
/// the oldest recency tick. A single mutex guards the map and the tick, so
/// concurrent lookups cannot corrupt LRU order or overshoot capacity.
pub struct IdentityCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
}

struct Entry {
    identity: Identity,
    last_used: u64,
}

impl IdentityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<Identity> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(source_id)?;
        entry.last_used = tick;
        Some(entry.identity.clone())
    }

    pub fn insert(&self, source_id: &str, identity: Identity) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(source_id) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            source_id.to_string(),
            Entry {
                identity,
                last_used: tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn identity(app: &str) -> Identity {
        Identity {
            app_name: app.to_string(),
            process_name: "web".to_string(),
        }
    }

    #[test]
    fn test_get_returns_inserted_identity() {
        let cache = IdentityCache::new(10);
        cache.insert("abc", identity("someapp"));
        let hit = cache.get("abc").unwrap();
        assert_eq!(hit.app_name, "someapp");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let cache = IdentityCache::new(100);
        for i in 0..150 {
            cache.insert(&format!("container-{i}"), identity("app"));
            assert!(cache.len() <= 100);
        }
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn test_insert_at_capacity_evicts_least_recently_used() {
        let cache = IdentityCache::new(3);
        cache.insert("a", identity("a"));
        cache.insert("b", identity("b"));
        cache.insert("c", identity("c"));

        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get("a").is_some());

        cache.insert("d", identity("d"));
        assert_eq!(cache.len(), 3);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_reinsert_existing_key_does_not_evict() {
        let cache = IdentityCache::new(2);
        cache.insert("a", identity("a"));
        cache.insert("b", identity("b"));
        cache.insert("a", identity("a2"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().app_name, "a2");
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_concurrent_access_keeps_invariants() {
        let cache = Arc::new(IdentityCache::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("c-{}", (t * 31 + i) % 120);
                        cache.insert(&key, identity("app"));
                        let _ = cache.get(&key);
                        assert!(cache.len() <= 50);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }
}
