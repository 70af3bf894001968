//! Idempotency keys and the local dedup cache for create.
//!
//! A create that times out may still have been applied by the backend. The
//! client sends the caller's key on every attempt and remembers, per key,
//! the payload hash and the item that came back. A retried create with the
//! same key is answered locally; the same key with a different payload is
//! rejected.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::model::{CanonicalWorkItem, WorkItemDraft};

/// Default number of keys remembered before the oldest are evicted.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// A caller-supplied key identifying one logical create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a caller-chosen key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Hashes a draft for key reuse detection.
#[must_use]
pub fn payload_hash(draft: &WorkItemDraft) -> String {
    // Field maps are ordered, so the serialized form is stable.
    let json = serde_json::to_string(draft).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    hex::encode(digest)
}

/// Result of looking a key up in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupLookup {
    /// The key was seen with the same payload.
    Hit(CanonicalWorkItem),
    /// The key was seen with a different payload.
    Mismatch,
    /// The key is unknown or expired.
    Miss,
}

#[derive(Debug, Clone)]
struct DedupEntry {
    payload_hash: String,
    item: CanonicalWorkItem,
    inserted: Instant,
}

/// Key to created item, with TTL and a size bound.
#[derive(Debug)]
pub struct DedupCache {
    entries: DashMap<String, DedupEntry>,
    ttl: Duration,
    capacity: usize,
}

impl DedupCache {
    /// Creates a cache that forgets keys after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }

    /// Sets the maximum number of remembered keys.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Looks up `key`, comparing the stored payload hash with `hash`.
    pub fn lookup(&self, key: &IdempotencyKey, hash: &str) -> DedupLookup {
        match self.entries.get(key.as_str()) {
            None => return DedupLookup::Miss,
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return if entry.payload_hash == hash {
                    DedupLookup::Hit(entry.item.clone())
                } else {
                    DedupLookup::Mismatch
                };
            }
            Some(_) => {}
        }

        self.entries.remove(key.as_str());
        DedupLookup::Miss
    }

    /// Remembers the item created under `key`.
    pub fn store(&self, key: &IdempotencyKey, hash: impl Into<String>, item: CanonicalWorkItem) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key.as_str()) {
            self.evict();
        }
        self.entries.insert(
            key.as_str().to_string(),
            DedupEntry {
                payload_hash: hash.into(),
                item,
                inserted: Instant::now(),
            },
        );
    }

    /// Number of remembered keys, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired entries, then the oldest one if still full.
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);

        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItemType;

    fn item(id: &str) -> CanonicalWorkItem {
        CanonicalWorkItem::new(id, WorkItemType::Task, "Write docs", "1")
    }

    #[test]
    fn test_generated_keys_are_unique() {
        assert_ne!(IdempotencyKey::generate(), IdempotencyKey::generate());
        assert_eq!(IdempotencyKey::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_payload_hash_tracks_content() {
        let draft = WorkItemDraft::new(WorkItemType::Task, "Write docs");
        assert_eq!(payload_hash(&draft), payload_hash(&draft.clone()));
        assert_ne!(
            payload_hash(&draft),
            payload_hash(&WorkItemDraft::new(WorkItemType::Task, "Write tests"))
        );
        assert_eq!(payload_hash(&draft).len(), 64);
    }

    #[test]
    fn test_hit_miss_and_mismatch() {
        let cache = DedupCache::new(Duration::from_secs(60));
        let key = IdempotencyKey::new("k1");

        assert_eq!(cache.lookup(&key, "h"), DedupLookup::Miss);
        cache.store(&key, "h", item("7"));
        assert_eq!(cache.lookup(&key, "h"), DedupLookup::Hit(item("7")));
        assert_eq!(cache.lookup(&key, "other"), DedupLookup::Mismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let key = IdempotencyKey::new("k1");
        cache.store(&key, "h", item("7"));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.lookup(&key, "h"), DedupLookup::Miss);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = DedupCache::new(Duration::from_secs(60)).with_capacity(2);
        cache.store(&"a".into(), "h", item("1"));
        tokio::time::advance(Duration::from_millis(5)).await;
        cache.store(&"b".into(), "h", item("2"));
        tokio::time::advance(Duration::from_millis(5)).await;
        cache.store(&"c".into(), "h", item("3"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(&"a".into(), "h"), DedupLookup::Miss);
        assert_eq!(cache.lookup(&"c".into(), "h"), DedupLookup::Hit(item("3")));
    }
}
