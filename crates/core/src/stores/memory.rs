use crate::error::StoreError;
use crate::index::DocumentIndex;
use crate::models::{DocumentRecord, Readiness};
use crate::store::{decode_index, encode_index};
use crate::traits::IndexStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Slot {
    document: Option<(DocumentRecord, Vec<u8>)>,
    index: Option<Vec<u8>>,
    status: Option<Readiness>,
}

/// Process-local store. Indexes are kept serialized so loads go through the
/// same decoding path as the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes as the index of `doc_id`, bypassing encoding.
    #[cfg(test)]
    pub(crate) async fn put_raw_index(&self, doc_id: &str, bytes: Vec<u8>) {
        let mut slots = self.slots.write().await;
        slots.entry(doc_id.to_string()).or_default().index = Some(bytes);
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn save_document(
        &self,
        record: &DocumentRecord,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        slots.entry(record.doc_id.clone()).or_default().document =
            Some((record.clone(), bytes.to_vec()));
        Ok(())
    }

    async fn load_document(&self, doc_id: &str) -> Result<(DocumentRecord, Vec<u8>), StoreError> {
        let slots = self.slots.read().await;
        slots
            .get(doc_id)
            .and_then(|slot| slot.document.clone())
            .ok_or_else(|| StoreError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })
    }

    async fn document_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        let slots = self.slots.read().await;
        Ok(slots.get(doc_id).is_some_and(|slot| slot.document.is_some()))
    }

    async fn persist_index(&self, index: &DocumentIndex) -> Result<(), StoreError> {
        let encoded = encode_index(index)?;
        let mut slots = self.slots.write().await;
        slots.entry(index.doc_id.clone()).or_default().index = Some(encoded);
        Ok(())
    }

    async fn load_index(&self, doc_id: &str) -> Result<DocumentIndex, StoreError> {
        let encoded = {
            let slots = self.slots.read().await;
            slots.get(doc_id).and_then(|slot| slot.index.clone())
        };
        let encoded = encoded.ok_or_else(|| StoreError::NotFound {
            doc_id: doc_id.to_string(),
        })?;
        decode_index(doc_id, &encoded)
    }

    async fn index_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        let slots = self.slots.read().await;
        Ok(slots.get(doc_id).is_some_and(|slot| slot.index.is_some()))
    }

    async fn clear_build(&self, doc_id: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(doc_id) {
            slot.index = None;
            slot.status = None;
        }
        Ok(())
    }

    async fn save_status(&self, doc_id: &str, status: &Readiness) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        slots.entry(doc_id.to_string()).or_default().status = Some(status.clone());
        Ok(())
    }

    async fn load_status(&self, doc_id: &str) -> Result<Option<Readiness>, StoreError> {
        let slots = self.slots.read().await;
        Ok(slots.get(doc_id).and_then(|slot| slot.status.clone()))
    }
}
