//! docqa-graph
//!
//! Passage similarity graph and neighbourhood-expansion retrieval.

pub mod expander;
pub mod graph;

pub use expander::GraphExpander;
pub use graph::{PassageNode, SimilarityGraph};
