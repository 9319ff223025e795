//! Batch processors that sort files into destination directories.
//!
//! [`FileClassifier`] only decides where each file belongs; [`FileScanner`]
//! also moves the file and records the move in the scan history.

pub mod classifier;
pub mod scanner;

pub use classifier::{ClassificationResult, FileClassifier};
pub use scanner::{FileScanner, MoveRecord};
