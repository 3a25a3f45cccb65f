use crate::error::{ProviderError, StoreError};
use crate::index::DocumentIndex;
use crate::models::{DocumentRecord, Readiness};
use async_trait::async_trait;

/// Turns text into fixed-size vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier, recorded in every index built with this client.
    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn max_input_chars(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Backends with native batching should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Produces an answer for a fully assembled prompt.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model(&self) -> &str;

    fn max_prompt_chars(&self) -> usize;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Durable per-document storage: raw upload, serialized index and the
/// terminal status of the last build. Every operation touches one `doc_id`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn save_document(&self, record: &DocumentRecord, bytes: &[u8])
        -> Result<(), StoreError>;

    async fn load_document(&self, doc_id: &str) -> Result<(DocumentRecord, Vec<u8>), StoreError>;

    async fn document_exists(&self, doc_id: &str) -> Result<bool, StoreError>;

    /// Replaces any previous index for the same document.
    async fn persist_index(&self, index: &DocumentIndex) -> Result<(), StoreError>;

    async fn load_index(&self, doc_id: &str) -> Result<DocumentIndex, StoreError>;

    async fn index_exists(&self, doc_id: &str) -> Result<bool, StoreError>;

    /// Drops the index and status left by a previous build.
    async fn clear_build(&self, doc_id: &str) -> Result<(), StoreError>;

    async fn save_status(&self, doc_id: &str, status: &Readiness) -> Result<(), StoreError>;

    async fn load_status(&self, doc_id: &str) -> Result<Option<Readiness>, StoreError>;
}
