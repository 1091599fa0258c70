use anyhow::{anyhow, Result};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use super::{validate_document_id, Document, DocumentStore};

/// In-process document store. Collections are created on first write and
/// vanish when their last document is deleted, as in Firestore.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Document>>>,
    failing_collections: Mutex<HashSet<String>>,
    failing_documents: Mutex<HashSet<(String, String)>>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail.
    pub fn fail_collection(&self, collection: &str) {
        self.failing_collections
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    /// Make writes of one document fail.
    pub fn fail_document(&self, collection: &str, id: &str) {
        self.failing_documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Successful `set_document` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Successful `delete_document` calls that removed something.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Copy of one collection, keyed by document id.
    pub fn snapshot(&self, collection: &str) -> BTreeMap<String, Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Paths of every non-empty collection.
    pub fn collection_paths(&self) -> Vec<String> {
        self.collections.lock().unwrap().keys().cloned().collect()
    }

    fn check_collection(&self, collection: &str) -> Result<()> {
        if self.failing_collections.lock().unwrap().contains(collection) {
            return Err(anyhow!("injected failure for collection {}", collection));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    async fn set_document(&self, collection: &str, id: &str, doc: &Document) -> Result<()> {
        validate_document_id(id)?;
        self.check_collection(collection)?;
        if self
            .failing_documents
            .lock()
            .unwrap()
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(anyhow!("injected failure for {}/{}", collection, id));
        }
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        self.check_collection(collection)?;
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.check_collection(collection)?;
        let mut guard = self.collections.lock().unwrap();
        let emptied = match guard.get_mut(collection) {
            Some(docs) => {
                if docs.remove(id).is_some() {
                    self.deletes.fetch_add(1, Ordering::Relaxed);
                }
                docs.is_empty()
            }
            None => false,
        };
        if emptied {
            guard.remove(collection);
        }
        Ok(())
    }
}
