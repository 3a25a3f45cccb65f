use crate::error::StoreError;
use crate::index::DocumentIndex;
use crate::models::DocumentRecord;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn new_doc_id() -> String {
    Uuid::new_v4().to_string()
}

/// Ids become directory names, so only a conservative alphabet is accepted.
pub fn is_valid_doc_id(doc_id: &str) -> bool {
    !doc_id.is_empty()
        && doc_id.len() <= 64
        && doc_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn document_record(doc_id: &str, filename: &str, bytes: &[u8]) -> DocumentRecord {
    DocumentRecord {
        doc_id: doc_id.to_string(),
        filename: filename.to_string(),
        byte_len: bytes.len() as u64,
        checksum: digest_bytes(bytes),
        submitted_at: Utc::now(),
    }
}

pub fn encode_index(index: &DocumentIndex) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(index)?)
}

/// Anything that does not parse into a consistent index for `doc_id` is
/// reported as [`StoreError::Corrupt`].
pub fn decode_index(doc_id: &str, bytes: &[u8]) -> Result<DocumentIndex, StoreError> {
    let index: DocumentIndex =
        serde_json::from_slice(bytes).map_err(|error| StoreError::Corrupt {
            doc_id: doc_id.to_string(),
            details: error.to_string(),
        })?;

    if index.doc_id != doc_id {
        return Err(StoreError::Corrupt {
            doc_id: doc_id.to_string(),
            details: format!("index was built for document {}", index.doc_id),
        });
    }
    index
        .check_consistency()
        .map_err(|details| StoreError::Corrupt {
            doc_id: doc_id.to_string(),
            details,
        })?;

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_index;

    #[test]
    fn doc_ids_are_path_safe() {
        assert!(is_valid_doc_id(&new_doc_id()));
        assert!(!is_valid_doc_id(""));
        assert!(!is_valid_doc_id("../etc"));
        assert!(!is_valid_doc_id("a/b"));
    }

    #[test]
    fn checksum_is_reproducible() {
        let record = document_record("doc-1", "a.pdf", b"abc");
        assert_eq!(record.checksum, digest_bytes(b"abc"));
        assert_eq!(record.byte_len, 3);
    }

    #[test]
    fn encoded_index_decodes_to_same_value() -> Result<(), StoreError> {
        let index = sample_index("doc-1", "The capital of France is Paris.");
        let decoded = decode_index("doc-1", &encode_index(&index)?)?;
        assert_eq!(decoded, index);
        Ok(())
    }

    #[test]
    fn garbage_is_corrupt() {
        let result = decode_index("doc-1", b"{not json");
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn index_for_other_document_is_corrupt() -> Result<(), StoreError> {
        let bytes = encode_index(&sample_index("doc-2", "The capital of France is Paris."))?;
        let result = decode_index("doc-1", &bytes);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        Ok(())
    }
}
