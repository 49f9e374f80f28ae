//! # vidlens Common Library
//!
//! Shared code for the vidlens service:
//! - Video, channel and batch data model
//! - Supervision vocabulary (fault kinds, directives)
//! - Service events and the event bus
//! - Configuration loading
//! - Pure text metrics (readability, sentiment, word tokenizing)

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod supervision;
pub mod text;

pub use error::{Error, Result};
pub use models::{ChannelProfile, SearchBatch, Sentiment, VideoResult, WordCount};
