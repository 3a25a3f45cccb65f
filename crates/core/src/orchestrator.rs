use crate::cache::IndexCache;
use crate::chunking::ChunkingConfig;
use crate::error::{AskError, IndexingError, StoreError, SubmitError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::IndexingPipeline;
use crate::models::{Answer, PipelineOptions, Readiness};
use crate::query::{QueryPipeline, StoredIndex};
use crate::retry::ProviderGuard;
use crate::store::is_valid_doc_id;
use crate::tracker::ReadinessTracker;
use crate::traits::{EmbeddingClient, GenerationClient, IndexStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Single entry point for submitting PDFs and asking questions about them.
///
/// Submissions return immediately with a `doc_id`; indexing continues in the
/// background and its progress is visible through [`DocumentQa::readiness`].
pub struct DocumentQa {
    store: Arc<dyn IndexStore>,
    tracker: Arc<ReadinessTracker>,
    indexing: Arc<IndexingPipeline>,
    query: QueryPipeline,
}

impl DocumentQa {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        options: PipelineOptions,
    ) -> Result<Self, IndexingError> {
        Self::with_extractor(store, embedder, generator, Arc::new(LopdfExtractor), options)
    }

    pub fn with_extractor(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        extractor: Arc<dyn PdfExtractor>,
        options: PipelineOptions,
    ) -> Result<Self, IndexingError> {
        let chunking = ChunkingConfig::try_from(&options)?;
        let guard = ProviderGuard::from(&options);
        let cache = Arc::new(IndexCache::with_capacity(
            Arc::clone(&store),
            options.cache_capacity,
        ));
        let tracker = Arc::new(ReadinessTracker::new());

        let indexing = Arc::new(IndexingPipeline::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&tracker),
            Arc::clone(&embedder),
            extractor,
            chunking,
            guard,
            options.max_concurrent_builds,
        ));
        let query = QueryPipeline::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&tracker),
            embedder,
            generator,
            guard,
            options.top_k,
        );

        Ok(Self {
            store,
            tracker,
            indexing,
            query,
        })
    }

    pub async fn submit_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, SubmitError> {
        self.indexing.submit(bytes, filename).await
    }

    /// Rebuilds a stored document's index from its saved bytes.
    pub async fn reindex(&self, doc_id: &str) -> Result<(), SubmitError> {
        if !is_valid_doc_id(doc_id) {
            return Err(SubmitError::InvalidArgument(format!(
                "malformed document id {doc_id:?}"
            )));
        }
        self.indexing.reindex(doc_id).await
    }

    /// Builds in flight are reported from memory. Anything else is recovered
    /// from the store: an index the current embedder can query means ready,
    /// an unreadable or foreign one means failed, a saved terminal status is
    /// returned as is, and a stored document with none of these was cut off
    /// mid-build.
    pub async fn readiness(&self, doc_id: &str) -> Result<Readiness, StoreError> {
        if let Some(state) = self.tracker.get(doc_id).await {
            return Ok(state);
        }
        if !is_valid_doc_id(doc_id) {
            return Ok(Readiness::Unknown);
        }
        match self.query.stored_index(doc_id).await? {
            StoredIndex::Servable(_) => return Ok(Readiness::Ready),
            StoredIndex::Unusable(reason) => return Ok(Readiness::Failed(reason)),
            StoredIndex::Missing => {}
        }
        if let Some(state) = self.store.load_status(doc_id).await? {
            return Ok(state);
        }
        if self.store.document_exists(doc_id).await? {
            return Ok(Readiness::Failed("indexing interrupted".to_string()));
        }
        Ok(Readiness::Unknown)
    }

    pub async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer, AskError> {
        self.query.ask(doc_id, question).await
    }

    /// Polls until the document reaches a terminal state, returning the
    /// last observed state when `timeout` runs out first.
    pub async fn wait_until_settled(
        &self,
        doc_id: &str,
        timeout: Duration,
    ) -> Result<Readiness, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.readiness(doc_id).await?;
            if state.is_settled() || matches!(state, Readiness::Unknown) {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Ok(state);
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }
}
