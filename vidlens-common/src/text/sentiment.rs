//! Happy/sad word lists and the batch sentiment rule

use crate::models::Sentiment;

/// Only the first this-many videos of a batch are counted
pub const SENTIMENT_VIDEO_CAP: usize = 50;

/// Fraction of matched words one side needs to decide the label
pub const DECISIVE_FRACTION: f64 = 0.70;

pub const HAPPY_WORDS: &[&str] = &[
    "happy",
    "wonderful",
    "great",
    "lovely",
    "excited",
    "yay",
    "!",
    "amazing",
    "benefits",
    "love",
    "excellent",
    "good",
    "laugh",
    "smile",
    "thankful",
    "thanks",
    "funny",
    "laugh-out-loud",
    "hilarious",
    "sweet",
    ":)",
    "awesome",
    "cute",
    "best",
];

pub const SAD_WORDS: &[&str] = &[
    "sad",
    "disappointed",
    "depressed",
    "upset",
    "hate",
    "angry",
    "frustrated",
    "gloomy",
    "terrible",
    "awful",
    "difficult",
    ":(",
    "cry",
    "death",
    "murder",
    "accident",
    "sickness",
    "illness",
    "disease",
    "lost",
    "loss",
    "sick",
    ">:(",
];

fn keeps(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || ":;()-_<>=*!|^".contains(c)
}

fn count_matches(text: &str, list: &[&str]) -> u64 {
    let cleaned: String = text.chars().filter(|c| keeps(*c)).collect();
    cleaned
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| list.contains(&token.as_str()))
        .count() as u64
}

/// Whitespace tokens of `text` found in the happy list (case-insensitive)
pub fn happy_word_count(text: &str) -> u64 {
    count_matches(text, HAPPY_WORDS)
}

/// Whitespace tokens of `text` found in the sad list (case-insensitive)
pub fn sad_word_count(text: &str) -> u64 {
    count_matches(text, SAD_WORDS)
}

/// Label for summed counts over a non-empty batch
///
/// An empty batch is [`Sentiment::Unavailable`] and never reaches this rule.
pub fn classify(happy: f64, sad: f64) -> Sentiment {
    let total = happy + sad;
    if total <= 0.0 {
        return Sentiment::Neutral;
    }
    if happy / total >= DECISIVE_FRACTION {
        Sentiment::Happy
    } else if sad / total >= DECISIVE_FRACTION {
        Sentiment::Sad
    } else {
        Sentiment::Neutral
    }
}
