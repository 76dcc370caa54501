//! Synonym dictionary and query expansion.
//!
//! Dictionaries are JSON files of synonym sets:
//!
//! ```json
//! { "language": "por", "synsets": [["carro", "automóvel"], ["casa", "lar"]] }
//! ```
//!
//! Every member of a set maps to all members of every set it appears in.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

use docqa_core::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct SynonymFile {
    language: String,
    #[serde(default)]
    synsets: Vec<Vec<String>>,
}

/// Lowercase token to lemma set, built once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SynonymMap {
    language: String,
    entries: HashMap<String, BTreeSet<String>>,
}

impl SynonymMap {
    pub fn empty(language: &str) -> Self {
        Self { language: language.to_string(), entries: HashMap::new() }
    }

    pub fn from_synsets(language: &str, synsets: &[Vec<String>]) -> Self {
        let mut entries: HashMap<String, BTreeSet<String>> = HashMap::new();
        for synset in synsets {
            let lemmas: BTreeSet<String> =
                synset.iter().map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty()).collect();
            for lemma in &lemmas {
                entries.entry(lemma.clone()).or_default().extend(lemmas.iter().cloned());
            }
        }
        Self { language: language.to_string(), entries }
    }

    /// Loads a dictionary file; its language must match `language`.
    pub fn load(path: &Path, language: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: SynonymFile = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidInput(format!("bad synonym file {}: {}", path.display(), e)))?;
        if file.language != language {
            return Err(Error::InvalidConfig(format!(
                "synonym file {} is for '{}', expected '{}'",
                path.display(),
                file.language,
                language
            )));
        }
        let map = Self::from_synsets(language, &file.synsets);
        info!(language, tokens = map.entries.len(), "loaded synonym map");
        Ok(map)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn synonyms(&self, token: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(token)
    }
}

#[derive(Debug, Clone)]
pub struct SynonymExpander {
    map: SynonymMap,
}

impl SynonymExpander {
    pub fn new(map: SynonymMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &SynonymMap {
        &self.map
    }

    /// Lowercased query words unioned with their synonyms. The set is sorted,
    /// so the original word order is not kept.
    pub fn expand_tokens(&self, query: &str) -> BTreeSet<String> {
        let mut expanded = BTreeSet::new();
        for token in query.unicode_words().map(str::to_lowercase) {
            if let Some(lemmas) = self.map.synonyms(&token) {
                expanded.extend(lemmas.iter().cloned());
            }
            expanded.insert(token);
        }
        expanded
    }

    pub fn expand(&self, query: &str) -> String {
        self.expand_tokens(query).into_iter().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synsets() -> Vec<Vec<String>> {
        vec![
            vec!["Carro".to_string(), "automóvel".to_string()],
            vec!["carro".to_string(), "vagão".to_string()],
        ]
    }

    #[test]
    fn members_map_to_union_of_their_sets() {
        let map = SynonymMap::from_synsets("por", &synsets());
        let carro: Vec<&str> = map.synonyms("carro").unwrap().iter().map(String::as_str).collect();
        assert_eq!(carro, vec!["automóvel", "carro", "vagão"]);
        assert_eq!(map.synonyms("vagão").unwrap().len(), 2);
    }

    #[test]
    fn unknown_tokens_expand_to_themselves() {
        let expander = SynonymExpander::new(SynonymMap::empty("por"));
        assert_eq!(expander.expand("Olá, Mundo!"), "mundo olá");
    }
}
