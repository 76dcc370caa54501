//! docqa-hybrid
//!
//! The query side of the system: dense retrieval, score fusion with the
//! lexical signal, cross-encoder reranking, ingestion of new passages, and
//! [`RetrievalEngine`], which wires every path behind one API.

pub mod dense;
pub mod engine;
pub mod fusion;
pub mod ingest;
pub mod rerank;

pub use dense::DenseRetriever;
pub use engine::{EngineOptions, RetrievalEngine};
pub use fusion::{combine, min_max_normalize, HybridRetriever, WeightedFusion};
pub use ingest::{IngestOutcome, Ingestor};
pub use rerank::Reranker;
