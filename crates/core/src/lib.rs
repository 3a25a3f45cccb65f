pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod query;
pub mod retry;
pub mod store;
pub mod stores;
pub mod tracker;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::IndexCache;
pub use chunking::{build_chunks, clean_extracted_text, normalize_whitespace, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AskError, ExtractionError, IndexingError, ProviderError, StoreError, SubmitError};
pub use extractor::{extract_document_text, LopdfExtractor, PageText, PdfExtractor};
pub use index::{cosine_similarity, DocumentIndex, Similarity};
pub use ingest::{discover_pdf_files, IndexingPipeline};
pub use models::{
    Answer, Chunk, DocumentRecord, IndexedChunk, IndexingStage, PipelineOptions, Readiness,
    RetryPolicy, ScoredChunk,
};
pub use orchestrator::DocumentQa;
pub use providers::{OpenAiChat, OpenAiConfig, OpenAiEmbeddings};
pub use query::QueryPipeline;
pub use retry::ProviderGuard;
pub use stores::{FsIndexStore, MemoryIndexStore};
pub use tracker::ReadinessTracker;
pub use traits::{EmbeddingClient, GenerationClient, IndexStore};
