//! Domain types used by the retrieval paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type PassageId = i64;
pub type DocumentId = i64;

/// Id an index lookup reports for an empty result slot.
pub const NO_MATCH: PassageId = -1;

/// A source document. Owns its passages exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub display_name: String,
    pub content_hash: String,
    pub raw_content: String,
    pub is_active: bool,
}

/// Fields supplied when registering a document; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub display_name: String,
    pub content_hash: String,
    pub raw_content: String,
    pub is_active: bool,
}

/// A chunk of document text with its precomputed embedding.
///
/// - `content_hash` is unique across the store
/// - `embedding` has the system-wide dimensionality
/// - `document_name` is joined from the parent document when the passage is read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub document_id: DocumentId,
    pub document_name: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub is_active: bool,
}

/// A passage about to be stored.
#[derive(Debug, Clone)]
pub struct NewPassage {
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// One ranked passage returned by a retrieval path. Built per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub passage_id: PassageId,
    #[serde(skip)]
    pub document_id: DocumentId,
    pub content: String,
    pub source_document_name: String,
    pub cosine_similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ScoredResult {
    pub fn from_passage(passage: &Passage, cosine_similarity: f32) -> Self {
        Self {
            passage_id: passage.id,
            document_id: passage.document_id,
            content: passage.content.clone(),
            source_document_name: passage.document_name.clone(),
            cosine_similarity,
            fused_score: None,
            rerank_score: None,
        }
    }
}

/// Which retrieval path serves a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Dense,
    Hybrid,
    Approximate,
    Graph,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Dense => "dense",
            Strategy::Hybrid => "hybrid",
            Strategy::Approximate => "approximate",
            Strategy::Graph => "graph",
        };
        f.write_str(s)
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dense" => Ok(Strategy::Dense),
            "hybrid" => Ok(Strategy::Hybrid),
            "approximate" | "ann" => Ok(Strategy::Approximate),
            "graph" => Ok(Strategy::Graph),
            other => Err(Error::InvalidInput(format!("unknown retrieval strategy '{other}'"))),
        }
    }
}
