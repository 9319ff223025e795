//! Matching engine: content modes, directory prototypes, and file comparison.

pub mod analyser;
pub mod mode;
pub mod prototype;

pub use analyser::{best_match, AnalyserSettings, FileAnalyser};
pub use mode::{is_hidden, ContentMode};
