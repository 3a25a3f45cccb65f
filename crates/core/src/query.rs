use crate::cache::IndexCache;
use crate::embeddings::ensure_within_limit;
use crate::error::{AskError, StoreError};
use crate::index::DocumentIndex;
use crate::models::Answer;
use crate::prompt::assemble_prompt;
use crate::retry::ProviderGuard;
use crate::store::is_valid_doc_id;
use crate::tracker::ReadinessTracker;
use crate::traits::{EmbeddingClient, GenerationClient, IndexStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the store holds for a document, judged against the configured
/// embedding model.
#[derive(Debug, Clone)]
pub(crate) enum StoredIndex {
    Servable(Arc<DocumentIndex>),
    Unusable(String),
    Missing,
}

/// Retrieval then generation over one document's index.
pub struct QueryPipeline {
    store: Arc<dyn IndexStore>,
    cache: Arc<IndexCache>,
    tracker: Arc<ReadinessTracker>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    guard: ProviderGuard,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<IndexCache>,
        tracker: Arc<ReadinessTracker>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        guard: ProviderGuard,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            cache,
            tracker,
            embedder,
            generator,
            guard,
            top_k: top_k.max(1),
        }
    }

    pub async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        let index = self.resolve(doc_id).await?;
        ensure_within_limit(self.embedder.model(), self.embedder.max_input_chars(), question)
            .map_err(AskError::Embedding)?;
        let query_vector = self
            .guard
            .call(self.embedder.model(), || self.embedder.embed(question))
            .await
            .map_err(AskError::Embedding)?;

        let ranked = index.search(&query_vector, self.top_k);
        debug!(
            doc_id,
            hits = ranked.len(),
            best_score = ranked.first().map(|hit| hit.score).unwrap_or_default(),
            "retrieved context"
        );

        let prompt = assemble_prompt(question, &ranked, self.generator.max_prompt_chars())?;
        let text = self
            .guard
            .call(self.generator.model(), || self.generator.generate(&prompt.text))
            .await
            .map_err(AskError::Generation)?;

        info!(
            doc_id,
            context_used = prompt.context_used,
            answer_chars = text.len(),
            "question answered"
        );

        Ok(Answer {
            doc_id: doc_id.to_string(),
            text,
            sources: ranked.into_iter().take(prompt.context_used).collect(),
        })
    }

    /// The tracker only holds builds in flight and outcomes the store lacks,
    /// so any entry there means the index must not be looked up. A rebuild
    /// can't be raced into serving the old index.
    async fn resolve(&self, doc_id: &str) -> Result<Arc<DocumentIndex>, AskError> {
        let in_memory = self.tracker.get(doc_id).await;
        if in_memory.is_some_and(|state| !state.is_ready()) {
            return Err(AskError::DocumentNotReady(doc_id.to_string()));
        }

        let known = is_valid_doc_id(doc_id)
            && self
                .store
                .document_exists(doc_id)
                .await
                .map_err(AskError::Storage)?;
        if !known {
            return Err(AskError::DocumentUnknown(doc_id.to_string()));
        }

        match self.stored_index(doc_id).await.map_err(AskError::Storage)? {
            StoredIndex::Servable(index) => Ok(index),
            StoredIndex::Unusable(_) | StoredIndex::Missing => {
                Err(AskError::DocumentNotReady(doc_id.to_string()))
            }
        }
    }

    /// Loads the persisted index and checks it can answer questions with the
    /// current embedder.
    pub(crate) async fn stored_index(&self, doc_id: &str) -> Result<StoredIndex, StoreError> {
        let index = match self.cache.get_or_load(doc_id).await {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(StoredIndex::Missing),
            Err(StoreError::Corrupt { details, .. }) => {
                return Ok(StoredIndex::Unusable(format!("index is corrupt: {details}")));
            }
            Err(error) => return Err(error),
        };

        if index.embedding_model != self.embedder.model() {
            warn!(
                doc_id,
                index_model = %index.embedding_model,
                client_model = %self.embedder.model(),
                "index was built with a different embedding model"
            );
            return Ok(StoredIndex::Unusable(format!(
                "index was built with embedding model {}",
                index.embedding_model
            )));
        }
        Ok(StoredIndex::Servable(index))
    }
}
