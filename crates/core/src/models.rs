use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Metadata kept next to the raw bytes of a submitted PDF.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub filename: String,
    pub byte_len: u64,
    pub checksum: String,
    pub submitted_at: DateTime<Utc>,
}

/// A contiguous character span of a document's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_index: u64,
    /// Offset of the first character, counted in chars.
    pub start_char: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IndexingStage {
    Received,
    Extracting,
    Chunking,
    Embedding,
    Persisting,
}

impl fmt::Display for IndexingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndexingStage::Received => "received",
            IndexingStage::Extracting => "extracting",
            IndexingStage::Chunking => "chunking",
            IndexingStage::Embedding => "embedding",
            IndexingStage::Persisting => "persisting",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of a document's index, as seen by collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Readiness {
    Unknown,
    NotReady(IndexingStage),
    Ready,
    NoExtractableText,
    Failed(String),
}

impl Readiness {
    /// Terminal states never change without a new build.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Readiness::Ready | Readiness::NoExtractableText | Readiness::Failed(_)
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Unknown => f.write_str("unknown"),
            Readiness::NotReady(stage) => write!(f, "not ready ({stage})"),
            Readiness::Ready => f.write_str("ready"),
            Readiness::NoExtractableText => f.write_str("no extractable text"),
            Readiness::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub doc_id: String,
    pub text: String,
    /// Chunks that made it into the prompt, best first.
    pub sources: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_concurrent_builds: usize,
    pub cache_capacity: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 2,
            provider_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_concurrent_builds: 4,
            cache_capacity: None,
        }
    }
}
