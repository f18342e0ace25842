use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// A document's title and type, the only fields the Context Service needs
/// when formatting a citation (spec §4.7, C7).
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub doc_type: crate::database::models::DocumentType,
}

struct Entry {
    meta: DocumentMeta,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Thread-safe in-memory cache of document metadata, scoped per owner+document
/// (spec §4.7, C7). Uses `DashMap` for lock-free concurrent access, mirroring
/// the session cache pattern used elsewhere in this codebase. Entries expire
/// lazily: a stale entry is only evicted the next time it's looked up.
pub struct MetadataCache {
    storage: Arc<DashMap<(String, Uuid), Entry>>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            storage: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, owner_id: &str, document_id: Uuid) -> Option<DocumentMeta> {
        let key = (owner_id.to_string(), document_id);
        let entry = self.storage.get(&key)?;

        if entry.is_expired(self.ttl) {
            drop(entry);
            self.storage.remove(&key);
            debug!(owner_id, %document_id, "metadata cache entry expired");
            return None;
        }

        Some(entry.meta.clone())
    }

    pub fn set(&self, owner_id: &str, document_id: Uuid, meta: DocumentMeta) {
        self.storage.insert(
            (owner_id.to_string(), document_id),
            Entry {
                meta,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, owner_id: &str, document_id: Uuid) {
        self.storage.remove(&(owner_id.to_string(), document_id));
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::DocumentType;

    fn meta(title: &str) -> DocumentMeta {
        DocumentMeta {
            title: title.to_string(),
            doc_type: DocumentType::Text,
        }
    }

    #[test]
    fn set_then_get_returns_the_same_title() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        cache.set("owner-a", id, meta("Flight Manual"));

        assert_eq!(cache.get("owner-a", id).unwrap().title, "Flight Manual");
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = MetadataCache::new(Duration::from_millis(1));
        let id = Uuid::new_v4();
        cache.set("owner-a", id, meta("Flight Manual"));

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("owner-a", id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn scoped_by_owner_even_for_the_same_document_id() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        cache.set("owner-a", id, meta("Owner A's copy"));

        assert!(cache.get("owner-b", id).is_none());
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        cache.set("owner-a", id, meta("Flight Manual"));
        cache.invalidate("owner-a", id);

        assert!(cache.get("owner-a", id).is_none());
    }
}
