use crate::error::IndexingError;
use crate::models::{Chunk, PipelineOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Window sizes are counted in `char`s, so a chunk never splits a UTF-8
/// sequence but may split a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, IndexingError> {
        if size == 0 {
            return Err(IndexingError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if overlap >= size {
            return Err(IndexingError::InvalidChunkConfig(format!(
                "overlap {overlap} must be smaller than chunk size {size}"
            )));
        }
        Ok(Self { size, overlap })
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

impl TryFrom<&PipelineOptions> for ChunkingConfig {
    type Error = IndexingError;

    fn try_from(value: &PipelineOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

const HYPHEN_BREAK_REGEX: &str = r"(\p{L})-[ \t]*\r?\n[ \t]*(\p{Ll})";

/// Re-joins words hyphenated across line breaks, then collapses whitespace.
pub fn clean_extracted_text(text: &str) -> Result<String, IndexingError> {
    let hyphen_break = Regex::new(HYPHEN_BREAK_REGEX)?;
    let joined = hyphen_break.replace_all(text, "$1$2");
    Ok(normalize_whitespace(&joined))
}

/// Fixed-size windows: window `i` starts at char `i * (size - overlap)`.
/// The last window may be shorter; empty input yields no windows.
pub fn split_with_overlap(text: &str, config: ChunkingConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.size).min(chars.len());
        windows.push((start, chars[start..end].iter().collect()));
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    windows
}

pub fn build_chunks(doc_id: &str, text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    split_with_overlap(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, (start, window))| Chunk {
            chunk_id: make_chunk_id(doc_id, index as u64, &window),
            doc_id: doc_id.to_string(),
            chunk_index: index as u64,
            start_char: start as u64,
            text: window,
        })
        .collect()
}

fn make_chunk_id(doc_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
