//! Word tokenizer for cumulative word statistics

use std::collections::HashMap;

/// Closed stop-word list; tokens of length <= 2 are dropped separately
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "http", "https", "are", "www", "the", "and", "or", "but", "on", "in", "with", "is",
    "to", "of", "for", "at", "by", "from", "as", "it", "this", "that", "been",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Split on non-word characters, lowercase, and keep alphabetic tokens
/// longer than two characters that are not stop-words
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .map(str::to_lowercase)
        .filter(|token| token.len() > 2)
        .filter(|token| token.chars().all(|c| c.is_ascii_lowercase()))
        .filter(|token| !is_stop_word(token))
}

/// Occurrence counts across a batch of texts, duplicates accumulated
pub fn count_words<S: AsRef<str>>(texts: &[S]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for text in texts {
        for token in tokenize(text.as_ref()) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    counts
}
