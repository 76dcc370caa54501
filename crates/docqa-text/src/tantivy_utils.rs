use tantivy::schema::{Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "docqa_whitespace";

#[derive(Debug, Clone, Copy)]
pub struct PassageFields {
    /// Position of the passage in the scored corpus slice.
    pub position: Field,
    pub text: Field,
}

pub fn build_schema() -> (Schema, PassageFields) {
    let mut schema_builder = Schema::builder();
    let position = schema_builder.add_u64_field("position", NumericOptions::default().set_stored());
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqs);
    let text = schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(text_field_indexing));
    (schema_builder.build(), PassageFields { position, text })
}

/// Whitespace split + lowercase; queries must be normalized the same way.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build();
    index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}

pub fn normalize_query_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    let mut out: Vec<String> = tokens
        .iter()
        .flat_map(|t| t.as_ref().split_whitespace().map(str::to_lowercase).collect::<Vec<_>>())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_tokens_are_lowercased_and_unique() {
        let tokens = normalize_query_tokens(&["Casa", "casa", "Verde Mar"]);
        assert_eq!(tokens, vec!["casa", "mar", "verde"]);
    }
}
