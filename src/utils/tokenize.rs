//! Deterministic tokenizer shared by the BM25 index registry (`search::bm25`).
//!
//! Lowercases and splits on non-alphanumeric boundaries using Unicode word
//! segmentation so accented and multi-byte scripts tokenize sanely. The same
//! function must be used for building the corpus and for scoring a query
//! (spec §4.6) — never reimplement this inline at a call site.

use unicode_segmentation::UnicodeSegmentation;

/// A small, fixed stopword list for English. Deterministic and conservative:
/// removing a stopword can only ever drop recall evenly across the corpus,
/// never change relative ranking in a content-dependent way.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "to", "in", "on", "at", "is", "are", "was",
    "were", "be", "been", "being", "it", "its", "this", "that", "these", "those", "for", "as",
    "by", "with", "from",
];

pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits() {
        let tokens = tokenize("The Aether Engine was invented by Seraphina Voss in 1442.");
        assert!(tokens.contains(&"aether".to_string()));
        assert!(tokens.contains(&"engine".to_string()));
        assert!(tokens.contains(&"1442".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"was".to_string()));
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn punctuation_is_not_a_token() {
        let tokens = tokenize("fall-of-the-city, vs. decline!");
        assert!(!tokens.iter().any(|t| t.contains(|c: char| !c.is_alphanumeric())));
    }
}
