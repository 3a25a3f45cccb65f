//! In-memory `doc_id -> index` map shared by both pipelines.
//!
//! Loads from the store and inserts by builders are serialized per key, so
//! two tasks never load or build the same document at once. Without a
//! capacity nothing is evicted; with one, the least recently used entry is
//! dropped and reloaded from the store on its next access.

use crate::error::StoreError;
use crate::index::DocumentIndex;
use crate::traits::IndexStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error};

struct CacheEntry {
    index: Arc<DocumentIndex>,
    last_used: AtomicU64,
}

pub struct IndexCache {
    store: Arc<dyn IndexStore>,
    capacity: Option<usize>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    clock: AtomicU64,
}

impl IndexCache {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self::with_capacity(store, None)
    }

    pub fn with_capacity(store: Arc<dyn IndexStore>, capacity: Option<usize>) -> Self {
        Self {
            store,
            capacity: capacity.map(|limit| limit.max(1)),
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Cached index only; never touches the store.
    pub async fn get(&self, doc_id: &str) -> Option<Arc<DocumentIndex>> {
        let entries = self.entries.read().await;
        entries.get(doc_id).map(|entry| {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            Arc::clone(&entry.index)
        })
    }

    /// Returns the cached index, or loads it from the store and caches it.
    /// `Ok(None)` means nothing is persisted for `doc_id` yet.
    pub async fn get_or_load(
        &self,
        doc_id: &str,
    ) -> Result<Option<Arc<DocumentIndex>>, StoreError> {
        if let Some(index) = self.get(doc_id).await {
            return Ok(Some(index));
        }

        let _guard = self.lock_key(doc_id).await;
        if let Some(index) = self.get(doc_id).await {
            return Ok(Some(index));
        }

        match self.store.load_index(doc_id).await {
            Ok(index) => {
                debug!(doc_id, chunk_count = index.len(), "index loaded from store");
                Ok(Some(self.insert(index).await))
            }
            Err(StoreError::NotFound { .. }) | Err(StoreError::DocumentNotFound { .. }) => {
                Ok(None)
            }
            Err(error @ StoreError::Corrupt { .. }) => {
                error!(doc_id, error = %error, "persisted index is corrupt");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Exclusive right to load or replace the entry for `doc_id`.
    pub async fn lock_key(&self, doc_id: &str) -> OwnedMutexGuard<()> {
        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            locks.retain(|key, lock| key == doc_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(doc_id.to_string()).or_default())
        };
        key_lock.lock_owned().await
    }

    pub async fn insert(&self, index: DocumentIndex) -> Arc<DocumentIndex> {
        let doc_id = index.doc_id.clone();
        let index = Arc::new(index);
        let mut entries = self.entries.write().await;
        entries.insert(
            doc_id.clone(),
            CacheEntry {
                index: Arc::clone(&index),
                last_used: AtomicU64::new(self.tick()),
            },
        );

        if let Some(capacity) = self.capacity {
            while entries.len() > capacity {
                let oldest = entries
                    .iter()
                    .filter(|(key, _)| **key != doc_id)
                    .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => {
                        debug!(doc_id = %key, "evicting cached index");
                        entries.remove(&key);
                    }
                    None => break,
                }
            }
        }

        index
    }

    pub async fn invalidate(&self, doc_id: &str) {
        self.entries.write().await.remove(doc_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
