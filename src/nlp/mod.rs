//! Lexicon-driven extraction over discussion text: flavors with intensity and
//! sentiment, roasters, origins, brew and process methods, prices, and keywords.

mod extract;
pub mod lexicon;
mod sentiment;

pub use extract::{Extractor, MAX_CONTEXT_CHARS, PostAnalysis};
