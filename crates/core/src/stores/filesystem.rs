use crate::error::StoreError;
use crate::index::DocumentIndex;
use crate::models::{DocumentRecord, Readiness};
use crate::store::{decode_index, encode_index, is_valid_doc_id};
use crate::traits::IndexStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const DOCUMENT_FILE: &str = "document.pdf";
const RECORD_FILE: &str = "document.json";
const INDEX_FILE: &str = "index.json";
const STATUS_FILE: &str = "status.json";

/// One directory per document under `root`:
///
/// ```text
/// <root>/<doc_id>/document.pdf
/// <root>/<doc_id>/document.json
/// <root>/<doc_id>/index.json
/// <root>/<doc_id>/status.json
/// ```
///
/// Files are written to a temporary sibling and renamed into place.
#[derive(Debug, Clone)]
pub struct FsIndexStore {
    root: PathBuf,
}

impl FsIndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_dir(&self, doc_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_doc_id(doc_id) {
            return Err(StoreError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            });
        }
        Ok(self.root.join(doc_id))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("blob");
        let staging = path.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, path).await?;
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

async fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

#[async_trait]
impl IndexStore for FsIndexStore {
    async fn save_document(
        &self,
        record: &DocumentRecord,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let dir = self.doc_dir(&record.doc_id)?;
        self.write_atomic(&dir.join(DOCUMENT_FILE), bytes).await?;
        self.write_atomic(&dir.join(RECORD_FILE), &serde_json::to_vec_pretty(record)?)
            .await
    }

    async fn load_document(&self, doc_id: &str) -> Result<(DocumentRecord, Vec<u8>), StoreError> {
        let dir = self.doc_dir(doc_id)?;
        let not_found = || StoreError::DocumentNotFound {
            doc_id: doc_id.to_string(),
        };

        let record = read_if_present(&dir.join(RECORD_FILE))
            .await?
            .ok_or_else(not_found)?;
        let bytes = read_if_present(&dir.join(DOCUMENT_FILE))
            .await?
            .ok_or_else(not_found)?;

        Ok((serde_json::from_slice(&record)?, bytes))
    }

    async fn document_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        if !is_valid_doc_id(doc_id) {
            return Ok(false);
        }
        Ok(fs::try_exists(self.doc_dir(doc_id)?.join(RECORD_FILE)).await?)
    }

    async fn persist_index(&self, index: &DocumentIndex) -> Result<(), StoreError> {
        let dir = self.doc_dir(&index.doc_id)?;
        self.write_atomic(&dir.join(INDEX_FILE), &encode_index(index)?)
            .await
    }

    async fn load_index(&self, doc_id: &str) -> Result<DocumentIndex, StoreError> {
        let path = self.doc_dir(doc_id)?.join(INDEX_FILE);
        let bytes = read_if_present(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                doc_id: doc_id.to_string(),
            })?;
        decode_index(doc_id, &bytes)
    }

    async fn index_exists(&self, doc_id: &str) -> Result<bool, StoreError> {
        if !is_valid_doc_id(doc_id) {
            return Ok(false);
        }
        Ok(fs::try_exists(self.doc_dir(doc_id)?.join(INDEX_FILE)).await?)
    }

    async fn clear_build(&self, doc_id: &str) -> Result<(), StoreError> {
        let dir = self.doc_dir(doc_id)?;
        remove_if_present(&dir.join(INDEX_FILE)).await?;
        remove_if_present(&dir.join(STATUS_FILE)).await
    }

    async fn save_status(&self, doc_id: &str, status: &Readiness) -> Result<(), StoreError> {
        let dir = self.doc_dir(doc_id)?;
        self.write_atomic(&dir.join(STATUS_FILE), &serde_json::to_vec(status)?)
            .await
    }

    async fn load_status(&self, doc_id: &str) -> Result<Option<Readiness>, StoreError> {
        let path = self.doc_dir(doc_id)?.join(STATUS_FILE);
        match read_if_present(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
