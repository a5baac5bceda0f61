#![forbid(unsafe_code)]

//! Document storage seam. Export documents are written through it inside the action transaction.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentStoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

pub trait DocumentStore: Send + Sync {
    fn put(&self, document_ref: &str, body: &[u8]) -> Result<(), DocumentStoreError>;

    fn get(&self, document_ref: &str) -> Result<Option<Vec<u8>>, DocumentStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn put(&self, document_ref: &str, body: &[u8]) -> Result<(), DocumentStoreError> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("lock poisoned".to_string()))?;
        docs.insert(document_ref.to_string(), body.to_vec());
        Ok(())
    }

    fn get(&self, document_ref: &str) -> Result<Option<Vec<u8>>, DocumentStoreError> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(docs.get(document_ref).cloned())
    }
}

/// Store that refuses every call. Used when no backend is configured and in rollback tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDocumentStore;

impl DocumentStore for UnavailableDocumentStore {
    fn put(&self, document_ref: &str, _body: &[u8]) -> Result<(), DocumentStoreError> {
        Err(DocumentStoreError::Unavailable(format!(
            "cannot store '{document_ref}'"
        )))
    }

    fn get(&self, document_ref: &str) -> Result<Option<Vec<u8>>, DocumentStoreError> {
        Err(DocumentStoreError::Unavailable(format!(
            "cannot read '{document_ref}'"
        )))
    }
}
