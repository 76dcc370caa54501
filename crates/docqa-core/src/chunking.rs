//! Paragraph/word-window chunker used by ingestion.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound per chunk in estimated tokens.
    pub chunk_size: usize,
    pub min_chars_per_chunk: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 512, min_chars_per_chunk: 128, overlap_percent: 0.2 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Splits `content` into unique chunks, first occurrence wins.
    pub fn chunk(&self, content: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if self.count_tokens(paragraph) <= self.config.chunk_size {
                pieces.push(paragraph.to_string());
            } else {
                pieces.extend(self.split_paragraph_with_overlap(paragraph));
            }
        }
        let merged = self.merge_short(pieces);
        let mut seen = HashSet::new();
        merged.into_iter().filter(|c| seen.insert(c.clone())).collect()
    }

    fn count_tokens(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f32 / 0.75) as usize
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = ((self.config.chunk_size as f32 * 0.75) as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * self.config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() {
                break;
            }
            start = end - overlap_words;
        }
        chunks
    }

    // Fragments below the minimum are carried into the next piece; a short tail joins the previous one.
    fn merge_short(&self, pieces: Vec<String>) -> Vec<String> {
        let min = self.config.min_chars_per_chunk;
        let mut merged: Vec<String> = Vec::new();
        let mut carry = String::new();
        for piece in pieces {
            let text = if carry.is_empty() { piece } else { format!("{carry} {piece}") };
            carry.clear();
            if text.chars().count() < min {
                carry = text;
            } else {
                merged.push(text);
            }
        }
        if !carry.is_empty() {
            match merged.last_mut() {
                Some(last) => {
                    last.push(' ');
                    last.push_str(&carry);
                }
                None => merged.push(carry),
            }
        }
        merged
    }
}

/// Stable content hash used to deduplicate passages and documents.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn bytes_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
