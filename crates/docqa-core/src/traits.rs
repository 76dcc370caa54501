use crate::error::{Error, Result};
use crate::types::{Document, DocumentId, NewDocument, NewPassage, Passage, PassageId, ScoredResult};

/// Maps text to fixed-dimension vectors. Deterministic for identical input.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Inference("encoder returned no vector".to_string()))
    }
}

/// Scores (query, passage) pairs jointly. Scores are unbounded logits.
pub trait CrossEncoder: Send + Sync {
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Read side of the passage store consumed by the retrieval engine.
pub trait PassageStore: Send + Sync {
    /// Active passages whose parent document is also active, ordered by id.
    fn list_active_passages(&self) -> Result<Vec<Passage>>;
    fn list_passages_by_ids(&self, ids: &[PassageId]) -> Result<Vec<Passage>>;
    fn list_passages_by_hashes(&self, hashes: &[String]) -> Result<Vec<Passage>>;
    fn get_passage(&self, id: PassageId) -> Result<Option<Passage>>;
}

/// Write side used by ingestion and document management.
///
/// Implementations serialize writes so that a replace never interleaves with a read
/// of the same document's passages.
pub trait PassageWriter: PassageStore {
    fn create_document(&self, document: NewDocument) -> Result<Document>;
    fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;
    fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>>;
    fn list_documents(&self) -> Result<Vec<Document>>;
    fn list_document_passages(&self, document_id: DocumentId) -> Result<Vec<Passage>>;
    /// Inserts passages whose hash is not yet stored; returns the new ids.
    fn insert_passages(&self, document_id: DocumentId, passages: Vec<NewPassage>) -> Result<Vec<PassageId>>;
    /// Deletes every passage of the document and inserts the given ones in one step.
    /// Returns `None` when the document does not exist.
    fn replace_document_passages(&self, document_id: DocumentId, passages: Vec<NewPassage>) -> Result<Option<Vec<PassageId>>>;
    fn set_document_active(&self, id: DocumentId, is_active: bool) -> Result<Option<Document>>;
    fn set_passage_active(&self, id: PassageId, is_active: bool) -> Result<Option<Passage>>;
    /// Deletes the document and its passages.
    fn delete_document(&self, id: DocumentId) -> Result<Option<Document>>;
}

/// A complete retrieval path: query in, ranked passages out.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>>;
}

/// A signal that scores a corpus snapshot, one score per passage, index-aligned.
pub trait CorpusScorer: Send + Sync {
    fn score_corpus(&self, query: &str, corpus: &[Passage]) -> Result<Vec<f32>>;
}
