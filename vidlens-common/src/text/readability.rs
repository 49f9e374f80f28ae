//! Flesch readability formulas
//!
//! Sentences are split on `.`, `!` and `?`; words on whitespace; syllables are
//! estimated by counting vowel groups in `aeiouy` with a silent trailing `e`.

use crate::models::ReadabilityScores;

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'y'];

/// Raw counts a score is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextMetrics {
    pub sentences: u64,
    pub words: u64,
    pub syllables: u64,
}

impl TextMetrics {
    pub fn measure(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        Self {
            sentences: count_sentences(text),
            words: words.len() as u64,
            syllables: words.iter().map(|w| count_syllables(w)).sum(),
        }
    }

    /// True when either ratio would divide by zero
    pub fn is_degenerate(&self) -> bool {
        self.sentences == 0 || self.words == 0
    }

    fn words_per_sentence(&self) -> f64 {
        self.words as f64 / self.sentences as f64
    }

    fn syllables_per_word(&self) -> f64 {
        self.syllables as f64 / self.words as f64
    }

    pub fn flesch_kincaid_grade(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        round2(0.39 * self.words_per_sentence() + 11.8 * self.syllables_per_word() - 15.59)
    }

    pub fn flesch_reading_ease(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        round2(206.835 - 1.015 * self.words_per_sentence() - 84.6 * self.syllables_per_word())
    }
}

/// Number of sentence fragments between terminators
///
/// Trailing empty fragments are dropped, so `"Hello."` is one sentence and
/// `"..."` is none.
pub fn count_sentences(text: &str) -> u64 {
    let mut fragments: Vec<&str> = text.split(['.', '!', '?']).collect();
    while fragments.last().is_some_and(|f| f.is_empty()) {
        fragments.pop();
    }
    fragments.len() as u64
}

pub fn count_syllables(word: &str) -> u64 {
    let lower = word.to_lowercase();
    let mut count = 0u64;
    let mut last_was_vowel = false;

    for c in lower.chars() {
        if VOWELS.contains(&c) {
            if !last_was_vowel {
                count += 1;
                last_was_vowel = true;
            }
        } else {
            last_was_vowel = false;
        }
    }

    if lower.ends_with('e') && count > 1 {
        count -= 1;
    }
    count
}

/// Scores for an optional description; missing or blank text scores 0.0
pub fn readability_scores(description: Option<&str>) -> ReadabilityScores {
    match description {
        Some(text) if !text.trim().is_empty() => {
            let metrics = TextMetrics::measure(text);
            ReadabilityScores {
                flesch_kincaid_grade: metrics.flesch_kincaid_grade(),
                flesch_reading_ease: metrics.flesch_reading_ease(),
            }
        }
        _ => ReadabilityScores::ZERO,
    }
}

/// Round to two decimal places, halves away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
