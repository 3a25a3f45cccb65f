use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no extractable text layer")]
    NoExtractableText,
}

/// Failure of an external embedding or completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("{backend} returned status {status}: {details}")]
    Status {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("{backend} did not answer within {millis}ms")]
    Timeout { backend: String, millis: u64 },

    #[error("input of {actual} chars exceeds the {limit} char limit of {backend}")]
    InputTooLarge {
        backend: String,
        limit: usize,
        actual: usize,
    },

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } => true,
            ProviderError::Http(error) => error.is_timeout() || error.is_connect(),
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no persisted index for document {doc_id}")]
    NotFound { doc_id: String },

    #[error("persisted index for document {doc_id} is corrupt: {details}")]
    Corrupt { doc_id: String, details: String },

    #[error("no stored document {doc_id}")]
    DocumentNotFound { doc_id: String },
}

/// Failures inside the indexing pipeline. These never escape a background
/// build: they are recorded as the document's terminal readiness state.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    EmbeddingCount { chunks: usize, embeddings: usize },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("indexing task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("unknown document: {0}")]
    DocumentUnknown(String),

    #[error("document {0} is not ready for questions")]
    DocumentNotReady(String),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("question of {actual} chars leaves no room in a {limit} char prompt")]
    QuestionTooLong { limit: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
