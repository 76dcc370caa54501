//! BM25 lexical scoring over a corpus snapshot.
//!
//! The index lives in RAM and is rebuilt on every call, so scores always
//! reflect exactly the passages handed in.

use std::sync::Arc;
use std::time::Instant;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};
use tracing::{debug, instrument};
use unicode_segmentation::UnicodeSegmentation;

use docqa_core::error::{Error, Result};
use docqa_core::traits::CorpusScorer;
use docqa_core::types::Passage;

use crate::synonyms::SynonymExpander;
use crate::tantivy_utils::{build_schema, normalize_query_tokens, register_tokenizer};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

fn index_err(e: tantivy::TantivyError) -> Error {
    Error::Index(e.to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    /// One BM25 score per passage, index-aligned with `corpus`.
    ///
    /// Passages sharing no term with the query score `0.0`; an empty query or
    /// corpus yields all zeros.
    #[instrument(skip_all, fields(tokens = query_tokens.len(), corpus = corpus.len()))]
    pub fn score<S: AsRef<str>>(&self, query_tokens: &[S], corpus: &[Passage]) -> Result<Vec<f32>> {
        let mut scores = vec![0.0f32; corpus.len()];
        let tokens = normalize_query_tokens(query_tokens);
        if corpus.is_empty() || tokens.is_empty() {
            return Ok(scores);
        }
        let started = Instant::now();

        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES).map_err(index_err)?;
        for (position, passage) in corpus.iter().enumerate() {
            writer
                .add_document(doc!(fields.position => position as u64, fields.text => passage.content.as_str()))
                .map_err(index_err)?;
        }
        writer.commit().map_err(index_err)?;

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let q: Box<dyn Query> =
                    Box::new(TermQuery::new(Term::from_field_text(fields.text, t), IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = index.reader().map_err(index_err)?.searcher();
        let hits = searcher.search(&query, &TopDocs::with_limit(corpus.len())).map_err(index_err)?;
        for (score, address) in hits {
            let stored: TantivyDocument = searcher.doc(address).map_err(index_err)?;
            let position = stored
                .get_first(fields.position)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::Index("lexical hit without position".to_string()))?;
            if let Some(slot) = usize::try_from(position).ok().and_then(|p| scores.get_mut(p)) {
                *slot = score;
            }
        }
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "bm25 scored corpus");
        Ok(scores)
    }
}

/// Lexical signal for fusion: optional synonym expansion, then BM25.
#[derive(Clone, Default)]
pub struct Bm25Scorer {
    scorer: LexicalScorer,
    expander: Option<Arc<SynonymExpander>>,
}

impl Bm25Scorer {
    pub fn new(expander: Option<Arc<SynonymExpander>>) -> Self {
        Self { scorer: LexicalScorer::new(), expander }
    }

    /// Query words by unicode segmentation, so punctuation never sticks to a term.
    pub fn query_tokens(&self, query: &str) -> Vec<String> {
        match &self.expander {
            Some(expander) => expander.expand_tokens(query).into_iter().collect(),
            None => query.unicode_words().map(str::to_lowercase).collect(),
        }
    }
}

impl CorpusScorer for Bm25Scorer {
    fn score_corpus(&self, query: &str, corpus: &[Passage]) -> Result<Vec<f32>> {
        self.scorer.score(&self.query_tokens(query), corpus)
    }
}
