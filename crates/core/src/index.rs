//! Per-document vector index.
//!
//! Flat list of `(chunk, embedding)` pairs searched by brute force. Scores
//! are cosine similarity in `[-1, 1]`; `search` returns the `top_k` highest
//! scores, ties broken by chunk order.

use crate::error::{IndexingError, ProviderError};
use crate::models::{Chunk, IndexedChunk, ScoredChunk};
use crate::retry::ProviderGuard;
use crate::traits::EmbeddingClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Chunks sent to the embedding provider per request.
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Cosine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentIndex {
    pub format_version: u32,
    pub doc_id: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub similarity: Similarity,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<IndexedChunk>,
}

impl DocumentIndex {
    pub fn from_parts(
        doc_id: &str,
        embedding_model: &str,
        dimensions: usize,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexingError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexingError::EmbeddingCount {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let index = Self {
            format_version: INDEX_FORMAT_VERSION,
            doc_id: doc_id.to_string(),
            embedding_model: embedding_model.to_string(),
            dimensions,
            similarity: Similarity::Cosine,
            built_at: Utc::now(),
            entries: chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
                .collect(),
        };

        index
            .check_consistency()
            .map_err(IndexingError::Aborted)?;
        Ok(index)
    }

    /// Structural checks applied both after a build and after a load.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.format_version != INDEX_FORMAT_VERSION {
            return Err(format!(
                "unsupported index format version {}",
                self.format_version
            ));
        }
        if self.entries.is_empty() {
            return Err("index holds no chunks".to_string());
        }
        for entry in &self.entries {
            if entry.embedding.len() != self.dimensions {
                return Err(format!(
                    "chunk {} has embedding dimension {} != {}",
                    entry.chunk.chunk_index,
                    entry.embedding.len(),
                    self.dimensions
                ));
            }
            if entry.chunk.doc_id != self.doc_id {
                return Err(format!(
                    "chunk {} belongs to document {}",
                    entry.chunk.chunk_index, entry.chunk.doc_id
                ));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, query_vector),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then(left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
        });
        scored.truncate(top_k);
        scored
    }
}

/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Embeds every chunk and assembles the index. The first failed provider
/// call aborts the whole build; nothing partial is returned.
pub async fn build_index(
    embedder: &dyn EmbeddingClient,
    guard: &ProviderGuard,
    doc_id: &str,
    chunks: Vec<Chunk>,
) -> Result<DocumentIndex, IndexingError> {
    let limit = embedder.max_input_chars();
    if let Some(oversized) = chunks.iter().find(|chunk| chunk.text.chars().count() > limit) {
        return Err(IndexingError::Embedding(ProviderError::InputTooLarge {
            backend: embedder.model().to_string(),
            limit,
            actual: oversized.text.chars().count(),
        }));
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = guard
            .call(embedder.model(), || embedder.embed_batch(&texts))
            .await
            .map_err(IndexingError::Embedding)?;
        if vectors.len() != batch.len() {
            return Err(IndexingError::EmbeddingCount {
                chunks: batch.len(),
                embeddings: vectors.len(),
            });
        }
        debug!(doc_id, embedded = embeddings.len() + vectors.len(), "embedded chunk batch");
        embeddings.extend(vectors);
    }

    let index = DocumentIndex::from_parts(
        doc_id,
        embedder.model(),
        embedder.dimensions(),
        chunks,
        embeddings,
    )?;
    info!(doc_id, chunk_count = index.len(), model = %index.embedding_model, "index built");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{build_chunks, ChunkingConfig};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::RetryPolicy;
    use crate::testing::FailingEmbedder;
    use std::time::Duration;

    fn guard() -> ProviderGuard {
        ProviderGuard::new(Duration::from_secs(5), RetryPolicy::default())
    }

    fn chunks(doc_id: &str, text: &str) -> Vec<Chunk> {
        let config = ChunkingConfig::new(40, 5).expect("valid config");
        build_chunks(doc_id, text, config)
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_ranks_by_score_then_chunk_order() -> Result<(), IndexingError> {
        let parts = chunks("doc-1", &"x".repeat(120));
        let vectors = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.5, 0.5],
        ];
        let index = DocumentIndex::from_parts("doc-1", "test", 2, parts, vectors)?;

        let hits = index.search(&[1.0, 0.0], 3);
        let order: Vec<u64> = hits.iter().map(|hit| hit.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let parts = chunks("doc-1", "short text");
        let result = DocumentIndex::from_parts("doc-1", "test", 2, parts, Vec::new());
        assert!(matches!(result, Err(IndexingError::EmbeddingCount { .. })));
    }

    #[tokio::test]
    async fn build_embeds_every_chunk() -> Result<(), IndexingError> {
        let text = "Hydraulic pumps move fluid. The capital of France is Paris. ".repeat(5);
        let parts = chunks("doc-1", &text);
        let expected = parts.len();
        let embedder = CharacterNgramEmbedder { dimensions: 64 };

        let index = build_index(&embedder, &guard(), "doc-1", parts).await?;
        assert_eq!(index.len(), expected);
        assert_eq!(index.dimensions, 64);
        assert_eq!(index.similarity, Similarity::Cosine);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_aborts_build() {
        let parts = chunks("doc-1", &"some words ".repeat(30));
        let result = build_index(&FailingEmbedder, &guard(), "doc-1", parts).await;
        assert!(matches!(result, Err(IndexingError::Embedding(_))));
    }
}
