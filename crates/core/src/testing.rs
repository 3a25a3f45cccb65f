//! Fixtures shared by unit tests: tiny PDFs built with lopdf and scripted
//! providers.

use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::CharacterNgramEmbedder;
use crate::error::{ProviderError, StoreError};
use crate::index::{build_index, DocumentIndex};
use crate::models::{DocumentRecord, Readiness, RetryPolicy};
use crate::retry::ProviderGuard;
use crate::stores::MemoryIndexStore;
use crate::traits::{EmbeddingClient, GenerationClient, IndexStore};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

fn pdf_with_pages(contents: Vec<Content>) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// One page per entry, each holding a single line of text.
pub(crate) fn text_pdf(pages: &[&str]) -> Result<Vec<u8>, Box<dyn Error>> {
    let contents = pages
        .iter()
        .map(|text| Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        })
        .collect();
    pdf_with_pages(contents)
}

/// Valid PDF whose pages only draw a line, like a scan without OCR.
pub(crate) fn blank_pdf(page_count: usize) -> Result<Vec<u8>, Box<dyn Error>> {
    let contents = (0..page_count)
        .map(|_| Content {
            operations: vec![
                Operation::new("m", vec![72.into(), 72.into()]),
                Operation::new("l", vec![500.into(), 700.into()]),
                Operation::new("S", vec![]),
            ],
        })
        .collect();
    pdf_with_pages(contents)
}

/// Single-chunk index with a fixed 2-dimensional embedding.
pub(crate) fn sample_index(doc_id: &str, text: &str) -> DocumentIndex {
    let config = ChunkingConfig::new(512, 0).expect("valid config");
    let mut chunks = build_chunks(doc_id, text, config);
    chunks.truncate(1);
    DocumentIndex::from_parts(doc_id, "test-model", 2, chunks, vec![vec![1.0, 0.0]])
        .expect("sample index is consistent")
}

/// Index built the way the pipeline builds it, with the offline embedder.
pub(crate) async fn embedded_index(doc_id: &str, text: &str) -> DocumentIndex {
    let config = ChunkingConfig::new(40, 5).expect("valid config");
    let guard = ProviderGuard::new(Duration::from_secs(5), RetryPolicy::default());
    build_index(
        &CharacterNgramEmbedder::default(),
        &guard,
        doc_id,
        build_chunks(doc_id, text, config),
    )
    .await
    .expect("offline embedding never fails")
}

/// Rejects every request with a non-retryable status.
pub(crate) struct FailingEmbedder;

#[async_trait]
impl EmbeddingClient for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn max_input_chars(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Status {
            backend: "failing".to_string(),
            status: 400,
            details: "rejected".to_string(),
        })
    }
}

/// Offline embedder that holds every call until [`GatedEmbedder::open`].
pub(crate) struct GatedEmbedder {
    inner: CharacterNgramEmbedder,
    gate: Semaphore,
    calls: AtomicUsize,
}

impl GatedEmbedder {
    pub(crate) fn closed() -> Self {
        Self {
            inner: CharacterNgramEmbedder::default(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open_now() -> Self {
        let embedder = Self::closed();
        embedder.open();
        embedder
    }

    pub(crate) fn open(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for GatedEmbedder {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn max_input_chars(&self) -> usize {
        self.inner.max_input_chars()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|error| ProviderError::Config(error.to_string()))?;
        Ok(self.inner.embed_sync(text))
    }
}

const CONTEXT_FENCE: &str = "---------------------\n";

/// Answers with the context section of the prompt it was given.
#[derive(Default)]
pub(crate) struct ContextEchoGenerator {
    calls: AtomicUsize,
}

impl ContextEchoGenerator {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for ContextEchoGenerator {
    fn model(&self) -> &str {
        "echo"
    }

    fn max_prompt_chars(&self) -> usize {
        8_000
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = prompt
            .split(CONTEXT_FENCE)
            .nth(1)
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(context)
    }
}

pub(crate) struct FailingGenerator;

#[async_trait]
impl GenerationClient for FailingGenerator {
    fn model(&self) -> &str {
        "failing"
    }

    fn max_prompt_chars(&self) -> usize {
        8_000
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::BackendResponse {
            backend: "failing".to_string(),
            details: "no choices in response".to_string(),
        })
    }
}

/// In-memory store whose `load_document` waits until [`StallingStore::release`].
pub(crate) struct StallingStore {
    inner: MemoryIndexStore,
    gate: Semaphore,
    loads_started: AtomicUsize,
}

impl StallingStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryIndexStore::new(),
            gate: Semaphore::new(0),
            loads_started: AtomicUsize::new(0),
        }
    }

    pub(crate) fn release(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn loads_started(&self) -> usize {
        self.loads_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexStore for StallingStore {
    async fn save_document(&self, record: &DocumentRecord, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.save_document(record, bytes).await
    }

    async fn load_document(&self, doc_id: &str) -> Result<(DocumentRecord, Vec<u8>), StoreError> {
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|error| StoreError::Io(std::io::Error::other(error.to_string())))?;
        self.inner.load_document(doc_id).await
    }

    async fn document_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        self.inner.document_exists(doc_id).await
    }

    async fn persist_index(&self, index: &DocumentIndex) -> Result<(), StoreError> {
        self.inner.persist_index(index).await
    }

    async fn load_index(&self, doc_id: &str) -> Result<DocumentIndex, StoreError> {
        self.inner.load_index(doc_id).await
    }

    async fn index_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        self.inner.index_exists(doc_id).await
    }

    async fn clear_build(&self, doc_id: &str) -> Result<(), StoreError> {
        self.inner.clear_build(doc_id).await
    }

    async fn save_status(&self, doc_id: &str, status: &Readiness) -> Result<(), StoreError> {
        self.inner.save_status(doc_id, status).await
    }

    async fn load_status(&self, doc_id: &str) -> Result<Option<Readiness>, StoreError> {
        self.inner.load_status(doc_id).await
    }
}
