// src/store/mod.rs
//! Document-database access.
//!
//! Uploaders talk to a [`DocumentStore`]; production runs use
//! [`FirestoreStore`], tests and dry runs use [`MemoryStore`].

use anyhow::{bail, Result};

pub mod auth;
pub mod firestore;
pub mod memory;
pub mod paths;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// A document body: field name → JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Firestore caps document ids at 1500 bytes.
const MAX_ID_BYTES: usize = 1500;

/// Minimal document-database surface the uploaders need.
///
/// `collection` is a slash-separated collection path such as
/// `artifacts/<app>/public/data/leagueRankings`; `id` is a single segment.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Create or fully replace the document.
    async fn set_document(&self, collection: &str, id: &str, doc: &Document) -> Result<()>;

    /// Ids of every document directly under `collection`.
    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>>;

    /// Deleting a document that does not exist is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;
}

/// Store chosen at startup: the real database or an in-process dry run.
pub enum Backend {
    Firestore(FirestoreStore),
    Memory(MemoryStore),
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Firestore(_) => "firestore",
            Backend::Memory(_) => "memory (dry run)",
        }
    }
}

impl DocumentStore for Backend {
    async fn set_document(&self, collection: &str, id: &str, doc: &Document) -> Result<()> {
        match self {
            Backend::Firestore(s) => s.set_document(collection, id, doc).await,
            Backend::Memory(s) => s.set_document(collection, id, doc).await,
        }
    }

    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        match self {
            Backend::Firestore(s) => s.list_document_ids(collection).await,
            Backend::Memory(s) => s.list_document_ids(collection).await,
        }
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        match self {
            Backend::Firestore(s) => s.delete_document(collection, id).await,
            Backend::Memory(s) => s.delete_document(collection, id).await,
        }
    }
}

/// Reject ids the database would misread as a path or refuse outright.
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("document id is empty");
    }
    if id.contains('/') {
        bail!("document id `{}` contains '/'", id);
    }
    if id == "." || id == ".." {
        bail!("document id `{}` is reserved", id);
    }
    if id.starts_with("__") && id.ends_with("__") {
        bail!("document id `{}` is reserved", id);
    }
    if id.len() > MAX_ID_BYTES {
        bail!("document id is {} bytes, limit is {}", id.len(), MAX_ID_BYTES);
    }
    Ok(())
}
