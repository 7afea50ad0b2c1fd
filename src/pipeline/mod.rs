//! Summarization pipeline — prompt construction, structured extraction,
//! and the background run driver.

pub mod actions;
pub mod summarizer;

pub use summarizer::Summarizer;
