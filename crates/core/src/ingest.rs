//! Background indexing: save → extract → chunk → embed → persist.
//!
//! Every submission runs as its own task. Failures never escape the task;
//! they become the document's terminal readiness state.

use crate::cache::IndexCache;
use crate::chunking::{build_chunks, clean_extracted_text, ChunkingConfig};
use crate::error::{ExtractionError, IndexingError, StoreError, SubmitError};
use crate::extractor::{extract_document_text, PdfExtractor};
use crate::index::{build_index, DocumentIndex};
use crate::models::{IndexingStage, Readiness};
use crate::retry::ProviderGuard;
use crate::store::{document_record, new_doc_id};
use crate::tracker::ReadinessTracker;
use crate::traits::{EmbeddingClient, IndexStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};
use walkdir::WalkDir;

enum BuildSource {
    Upload { bytes: Vec<u8>, filename: String },
    Stored,
}

pub struct IndexingPipeline {
    store: Arc<dyn IndexStore>,
    cache: Arc<IndexCache>,
    tracker: Arc<ReadinessTracker>,
    embedder: Arc<dyn EmbeddingClient>,
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
    guard: ProviderGuard,
    permits: Arc<Semaphore>,
}

impl IndexingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<IndexCache>,
        tracker: Arc<ReadinessTracker>,
        embedder: Arc<dyn EmbeddingClient>,
        extractor: Arc<dyn PdfExtractor>,
        chunking: ChunkingConfig,
        guard: ProviderGuard,
        max_concurrent_builds: usize,
    ) -> Self {
        Self {
            store,
            cache,
            tracker,
            embedder,
            extractor,
            chunking,
            guard,
            permits: Arc::new(Semaphore::new(max_concurrent_builds.max(1))),
        }
    }

    /// Registers the upload and starts its build in the background.
    /// Returns as soon as the document is known to the readiness tracker.
    pub async fn submit(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, SubmitError> {
        if bytes.is_empty() {
            return Err(SubmitError::InvalidArgument(format!(
                "uploaded file {filename} is empty"
            )));
        }

        let doc_id = new_doc_id();
        info!(doc_id = %doc_id, filename, byte_len = bytes.len(), "document received");
        self.spawn_build(
            doc_id.clone(),
            BuildSource::Upload {
                bytes,
                filename: filename.to_string(),
            },
        )
        .await;
        Ok(doc_id)
    }

    /// Rebuilds the index of a stored document from its saved bytes.
    pub async fn reindex(self: &Arc<Self>, doc_id: &str) -> Result<(), SubmitError> {
        if !self.store.document_exists(doc_id).await? {
            return Err(StoreError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            }
            .into());
        }
        info!(doc_id, "rebuild requested");
        self.spawn_build(doc_id.to_string(), BuildSource::Stored).await;
        Ok(())
    }

    async fn spawn_build(self: &Arc<Self>, doc_id: String, source: BuildSource) {
        let generation = self.tracker.begin(&doc_id).await;

        let pipeline = Arc::clone(self);
        let task_doc_id = doc_id.clone();
        let span = tracing::info_span!("indexing", doc_id = %doc_id, generation);
        let worker = tokio::spawn(
            async move { pipeline.run(&task_doc_id, generation, source).await }.instrument(span),
        );

        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            if let Err(join_error) = worker.await {
                error!(doc_id = %doc_id, error = %join_error, "indexing task died");
                let reason = IndexingError::Aborted(join_error.to_string()).to_string();
                tracker
                    .finish(&doc_id, generation, Readiness::Failed(reason), false)
                    .await;
            }
        });
    }

    /// Runs one build to its terminal state. Builds of the same document
    /// queue on the cache key lock; a build superseded while it ran still
    /// completes but no longer reports readiness.
    async fn run(&self, doc_id: &str, generation: u64, source: BuildSource) -> Readiness {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(closed) => {
                let state =
                    Readiness::Failed(IndexingError::Aborted(closed.to_string()).to_string());
                self.tracker
                    .finish(doc_id, generation, state.clone(), false)
                    .await;
                return state;
            }
        };
        let _key = self.cache.lock_key(doc_id).await;

        let state = match self.build(doc_id, generation, source).await {
            Ok(index) => {
                self.cache.insert(index).await;
                Readiness::Ready
            }
            Err(IndexingError::Extraction(ExtractionError::NoExtractableText)) => {
                warn!(doc_id, "pdf has no extractable text");
                Readiness::NoExtractableText
            }
            Err(error) => {
                error!(doc_id, error = %error, "indexing failed");
                Readiness::Failed(error.to_string())
            }
        };

        let durable = state.is_ready()
            || match self.store.save_status(doc_id, &state).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(doc_id, error = %error, "could not persist build status");
                    false
                }
            };
        self.tracker
            .finish(doc_id, generation, state.clone(), durable)
            .await;
        state
    }

    async fn build(
        &self,
        doc_id: &str,
        generation: u64,
        source: BuildSource,
    ) -> Result<DocumentIndex, IndexingError> {
        self.cache.invalidate(doc_id).await;

        let bytes = match source {
            BuildSource::Upload { bytes, filename } => {
                let record = document_record(doc_id, &filename, &bytes);
                self.store.save_document(&record, &bytes).await?;
                bytes
            }
            BuildSource::Stored => self.store.load_document(doc_id).await?.1,
        };
        self.store.clear_build(doc_id).await?;

        self.stage(doc_id, generation, IndexingStage::Extracting).await;
        let extractor = Arc::clone(&self.extractor);
        let text = tokio::task::spawn_blocking(move || {
            extract_document_text(extractor.as_ref(), &bytes)
        })
        .await
        .map_err(|join_error| IndexingError::Aborted(join_error.to_string()))??;

        self.stage(doc_id, generation, IndexingStage::Chunking).await;
        let cleaned = clean_extracted_text(&text)?;
        let chunks = build_chunks(doc_id, &cleaned, self.chunking);
        info!(doc_id, text_chars = cleaned.chars().count(), chunk_count = chunks.len(), "document chunked");

        self.stage(doc_id, generation, IndexingStage::Embedding).await;
        let index = build_index(self.embedder.as_ref(), &self.guard, doc_id, chunks).await?;

        self.stage(doc_id, generation, IndexingStage::Persisting).await;
        self.store.persist_index(&index).await?;
        Ok(index)
    }

    async fn stage(&self, doc_id: &str, generation: u64, stage: IndexingStage) {
        self.tracker
            .advance(doc_id, generation, Readiness::NotReady(stage))
            .await;
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
