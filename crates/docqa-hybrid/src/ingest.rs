//! Chunk, deduplicate, embed and store document content.
//!
//! Ingestion never touches the approximate index or the similarity graph;
//! callers rebuild those once a batch of documents is in.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use docqa_core::chunking::{bytes_hash, content_hash, Chunker};
use docqa_core::error::{Error, Result};
use docqa_core::math::check_dimension;
use docqa_core::traits::{Embedder, PassageWriter};
use docqa_core::types::{Document, DocumentId, NewDocument, NewPassage, PassageId};

const EMBED_BATCH: usize = 32;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document: Document,
    pub passages: Vec<PassageId>,
    /// The document content was already stored; nothing was added.
    pub duplicate: bool,
}

pub struct Ingestor {
    writer: Arc<dyn PassageWriter>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(writer: Arc<dyn PassageWriter>, embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self { writer, embedder, chunker }
    }

    /// Registers a document and ingests its content, unless a document with
    /// identical bytes already exists.
    pub fn add_document(&self, filename: &str, display_name: &str, raw_content: &str) -> Result<IngestOutcome> {
        let hash = bytes_hash(raw_content.as_bytes());
        if let Some(existing) = self.writer.find_document_by_hash(&hash)? {
            debug!(document_id = existing.id, filename, "document already stored");
            return Ok(IngestOutcome { document: existing, passages: Vec::new(), duplicate: true });
        }
        let document = self.writer.create_document(NewDocument {
            filename: filename.to_string(),
            display_name: display_name.to_string(),
            content_hash: hash,
            raw_content: raw_content.to_string(),
            is_active: true,
        })?;
        let passages = self.ingest(document.id, raw_content)?;
        Ok(IngestOutcome { document, passages, duplicate: false })
    }

    /// Adds passages for chunks whose hash is not stored yet.
    #[instrument(skip(self, content))]
    pub fn ingest(&self, document_id: DocumentId, content: &str) -> Result<Vec<PassageId>> {
        self.require_document(document_id)?;
        let fresh = self.prepare(content, |_| true)?;
        if fresh.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.writer.insert_passages(document_id, fresh)?;
        info!(document_id, passages = ids.len(), "ingested");
        Ok(ids)
    }

    /// Regenerates every passage of the document from `content` in one store write.
    #[instrument(skip(self, content))]
    pub fn replace(&self, document_id: DocumentId, content: &str) -> Result<Vec<PassageId>> {
        self.require_document(document_id)?;
        // The document's own hashes are about to be deleted, so only other documents block reuse.
        let fresh = self.prepare(content, |p_doc| p_doc != document_id)?;
        let ids = self
            .writer
            .replace_document_passages(document_id, fresh)?
            .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;
        info!(document_id, passages = ids.len(), "replaced passages");
        Ok(ids)
    }

    fn require_document(&self, document_id: DocumentId) -> Result<()> {
        match self.writer.get_document(document_id)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("document {document_id}"))),
        }
    }

    // `blocks` decides whether a stored passage of the given document makes a chunk a duplicate.
    fn prepare<F>(&self, content: &str, blocks: F) -> Result<Vec<NewPassage>>
    where
        F: Fn(DocumentId) -> bool,
    {
        let started = Instant::now();
        let chunks = self.chunker.chunk(content);
        let hashes: Vec<String> = chunks.iter().map(|c| content_hash(c)).collect();
        let stored: HashSet<String> = self
            .writer
            .list_passages_by_hashes(&hashes)?
            .into_iter()
            .filter(|p| blocks(p.document_id))
            .map(|p| p.content_hash)
            .collect();
        let pending: Vec<(String, String)> = chunks
            .into_iter()
            .zip(hashes)
            .filter(|(_, h)| !stored.contains(h))
            .collect();

        let mut passages = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(c, _)| c.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(Error::Inference(format!("encoder returned {} vectors for {} texts", vectors.len(), batch.len())));
            }
            for ((content, content_hash), embedding) in batch.iter().cloned().zip(vectors) {
                check_dimension(self.embedder.dim(), embedding.len())?;
                passages.push(NewPassage { content, content_hash, embedding });
            }
        }
        debug!(
            new = passages.len(),
            skipped = stored.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prepared passages"
        );
        Ok(passages)
    }
}
