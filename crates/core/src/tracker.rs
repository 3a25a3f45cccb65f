//! Readiness of builds started by this process.
//!
//! Every build gets a generation when it starts, and only the newest
//! generation of a document may report. A build superseded by a `reindex`
//! finishes silently. Settled states the store can answer for are dropped,
//! so the map only holds builds in flight and states that exist nowhere else.

use crate::models::{IndexingStage, Readiness};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct Entry {
    generation: u64,
    state: Readiness,
}

#[derive(Debug, Default)]
pub struct ReadinessTracker {
    states: RwLock<HashMap<String, Entry>>,
    generations: AtomicU64,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new build of `doc_id` and returns its generation.
    pub async fn begin(&self, doc_id: &str) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let state = Readiness::NotReady(IndexingStage::Received);
        info!(doc_id, generation, state = %state, "readiness changed");
        self.states
            .write()
            .await
            .insert(doc_id.to_string(), Entry { generation, state });
        generation
    }

    /// Records progress of build `generation`. Returns false when a newer
    /// build owns the document.
    pub async fn advance(&self, doc_id: &str, generation: u64, state: Readiness) -> bool {
        let mut states = self.states.write().await;
        match states.get_mut(doc_id) {
            Some(entry) if entry.generation == generation => {
                info!(doc_id, generation, state = %state, "readiness changed");
                entry.state = state;
                true
            }
            _ => {
                debug!(doc_id, generation, state = %state, "superseded build state dropped");
                false
            }
        }
    }

    /// Ends build `generation`. When `durable` the store already holds the
    /// outcome and the entry is forgotten.
    pub async fn finish(
        &self,
        doc_id: &str,
        generation: u64,
        state: Readiness,
        durable: bool,
    ) -> bool {
        let mut states = self.states.write().await;
        let current = states.get(doc_id).map(|entry| entry.generation);
        if current != Some(generation) {
            debug!(doc_id, generation, state = %state, "superseded build finished");
            return false;
        }

        info!(doc_id, generation, state = %state, durable, "build settled");
        if durable {
            states.remove(doc_id);
        } else if let Some(entry) = states.get_mut(doc_id) {
            entry.state = state;
        }
        true
    }

    pub async fn get(&self, doc_id: &str) -> Option<Readiness> {
        self.states
            .read()
            .await
            .get(doc_id)
            .map(|entry| entry.state.clone())
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}
