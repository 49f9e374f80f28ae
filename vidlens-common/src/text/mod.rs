//! Pure text analysis used by the enrichment workers
//!
//! Nothing in this module holds state; the workers own all mutable data.

pub mod readability;
pub mod sentiment;
pub mod words;

pub use readability::{readability_scores, round2, TextMetrics};
pub use sentiment::{classify, happy_word_count, sad_word_count, SENTIMENT_VIDEO_CAP};
pub use words::{count_words, is_stop_word, tokenize, STOP_WORDS};
