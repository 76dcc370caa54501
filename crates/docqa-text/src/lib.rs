//! docqa-text
//!
//! Lexical side of retrieval: a BM25 scorer over an in-RAM tantivy index built
//! from the corpus snapshot of each call, and a dictionary-backed synonym
//! expander applied to queries only.

pub mod bm25;
pub mod synonyms;
pub mod tantivy_utils;

pub use bm25::{Bm25Scorer, LexicalScorer};
pub use synonyms::{SynonymExpander, SynonymMap};
