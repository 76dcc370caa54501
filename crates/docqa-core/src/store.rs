//! In-process passage store with JSON snapshot persistence.
//!
//! Every write takes the single write lock, so a passage replacement is never
//! observed half-applied by a concurrent reader.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::{PassageStore, PassageWriter};
use crate::types::{Document, DocumentId, NewDocument, NewPassage, Passage, PassageId};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPassage {
    document_id: DocumentId,
    content: String,
    content_hash: String,
    embedding: Vec<f32>,
    is_active: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    documents: BTreeMap<DocumentId, Document>,
    passages: BTreeMap<PassageId, StoredPassage>,
    last_document_id: DocumentId,
    last_passage_id: PassageId,
}

impl StoreState {
    fn view(&self, id: PassageId, p: &StoredPassage) -> Passage {
        let document_name = self
            .documents
            .get(&p.document_id)
            .map(|d| d.display_name.clone())
            .unwrap_or_default();
        Passage {
            id,
            document_id: p.document_id,
            document_name,
            content: p.content.clone(),
            content_hash: p.content_hash.clone(),
            embedding: p.embedding.clone(),
            is_active: p.is_active,
        }
    }

    fn insert(&mut self, document_id: DocumentId, passages: Vec<NewPassage>) -> Vec<PassageId> {
        let mut known: HashSet<String> = self.passages.values().map(|p| p.content_hash.clone()).collect();
        let mut ids = Vec::new();
        for p in passages {
            if !known.insert(p.content_hash.clone()) {
                debug!(hash = %p.content_hash, "skipping passage with known hash");
                continue;
            }
            self.last_passage_id += 1;
            let id = self.last_passage_id;
            self.passages.insert(
                id,
                StoredPassage {
                    document_id,
                    content: p.content,
                    content_hash: p.content_hash,
                    embedding: p.embedding,
                    is_active: true,
                },
            );
            ids.push(id);
        }
        ids
    }

    fn remove_document_passages(&mut self, document_id: DocumentId) -> usize {
        let before = self.passages.len();
        self.passages.retain(|_, p| p.document_id != document_id);
        before - self.passages.len()
    }
}

#[derive(Default)]
pub struct MemoryPassageStore {
    state: RwLock<StoreState>,
}

impl MemoryPassageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot written by [`MemoryPassageStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let state: StoreState = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(format!("corrupt store snapshot {}: {}", path.display(), e)))?;
        info!(documents = state.documents.len(), passages = state.passages.len(), "loaded store snapshot");
        Ok(Self { state: RwLock::new(state) })
    }

    /// Loads the snapshot at `path`, or starts empty when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() { Self::load(path) } else { Ok(Self::new()) }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.read()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&*state).map_err(|e| Error::Storage(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| Error::Storage("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| Error::Storage("store lock poisoned".to_string()))
    }
}

impl PassageStore for MemoryPassageStore {
    fn list_active_passages(&self) -> Result<Vec<Passage>> {
        let state = self.read()?;
        Ok(state
            .passages
            .iter()
            .filter(|(_, p)| p.is_active && state.documents.get(&p.document_id).is_some_and(|d| d.is_active))
            .map(|(id, p)| state.view(*id, p))
            .collect())
    }

    fn list_passages_by_ids(&self, ids: &[PassageId]) -> Result<Vec<Passage>> {
        let state = self.read()?;
        let wanted: HashSet<PassageId> = ids.iter().copied().collect();
        Ok(state
            .passages
            .iter()
            .filter(|(id, _)| wanted.contains(id))
            .map(|(id, p)| state.view(*id, p))
            .collect())
    }

    fn list_passages_by_hashes(&self, hashes: &[String]) -> Result<Vec<Passage>> {
        let state = self.read()?;
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        Ok(state
            .passages
            .iter()
            .filter(|(_, p)| wanted.contains(p.content_hash.as_str()))
            .map(|(id, p)| state.view(*id, p))
            .collect())
    }

    fn get_passage(&self, id: PassageId) -> Result<Option<Passage>> {
        let state = self.read()?;
        Ok(state.passages.get(&id).map(|p| state.view(id, p)))
    }
}

impl PassageWriter for MemoryPassageStore {
    fn create_document(&self, document: NewDocument) -> Result<Document> {
        let mut state = self.write()?;
        state.last_document_id += 1;
        let doc = Document {
            id: state.last_document_id,
            filename: document.filename,
            display_name: document.display_name,
            content_hash: document.content_hash,
            raw_content: document.raw_content,
            is_active: document.is_active,
        };
        state.documents.insert(doc.id, doc.clone());
        info!(document_id = doc.id, filename = %doc.filename, "created document");
        Ok(doc)
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.values().find(|d| d.content_hash == content_hash).cloned())
    }

    fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.read()?.documents.values().cloned().collect())
    }

    fn list_document_passages(&self, document_id: DocumentId) -> Result<Vec<Passage>> {
        let state = self.read()?;
        Ok(state
            .passages
            .iter()
            .filter(|(_, p)| p.document_id == document_id)
            .map(|(id, p)| state.view(*id, p))
            .collect())
    }

    fn insert_passages(&self, document_id: DocumentId, passages: Vec<NewPassage>) -> Result<Vec<PassageId>> {
        let mut state = self.write()?;
        if !state.documents.contains_key(&document_id) {
            return Err(Error::NotFound(format!("document {document_id}")));
        }
        Ok(state.insert(document_id, passages))
    }

    fn replace_document_passages(&self, document_id: DocumentId, passages: Vec<NewPassage>) -> Result<Option<Vec<PassageId>>> {
        let mut state = self.write()?;
        if !state.documents.contains_key(&document_id) {
            return Ok(None);
        }
        let removed = state.remove_document_passages(document_id);
        let ids = state.insert(document_id, passages);
        info!(document_id, removed, inserted = ids.len(), "replaced document passages");
        Ok(Some(ids))
    }

    fn set_document_active(&self, id: DocumentId, is_active: bool) -> Result<Option<Document>> {
        let mut state = self.write()?;
        Ok(state.documents.get_mut(&id).map(|d| {
            d.is_active = is_active;
            d.clone()
        }))
    }

    fn set_passage_active(&self, id: PassageId, is_active: bool) -> Result<Option<Passage>> {
        let mut state = self.write()?;
        let Some(p) = state.passages.get_mut(&id) else {
            return Ok(None);
        };
        p.is_active = is_active;
        let p = p.clone();
        Ok(Some(state.view(id, &p)))
    }

    fn delete_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let mut state = self.write()?;
        let Some(doc) = state.documents.remove(&id) else {
            return Ok(None);
        };
        let removed = state.remove_document_passages(id);
        info!(document_id = id, removed, "deleted document");
        Ok(Some(doc))
    }
}
