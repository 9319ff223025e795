//! Error taxonomy shared by the library modules.
//!
//! Per-item failures ([`Error::UnsupportedFileType`], [`Error::BelowThreshold`],
//! [`Error::InvalidFile`], [`Error::MoveFailed`], ...) are recovered by the batch
//! engine and reported to the listener. Anything escaping a batch sink aborts the run.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("model not loaded: {0} (call init() first)")]
    ModelNotLoaded(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("no eligible {mode} files to build a prototype in {}", .dir.display())]
    EmptyDirectory { dir: PathBuf, mode: String },

    #[error("best match {similarity:.4} for {} is below threshold {threshold}", .path.display())]
    BelowThreshold {
        path: PathBuf,
        similarity: f32,
        threshold: f32,
    },

    #[error("no destination could be compared against {}", .0.display())]
    NoMatch(PathBuf),

    #[error("invalid file: {}", .0.display())]
    InvalidFile(PathBuf),

    #[error("invalid directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("failed to move {} to {}: {reason}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("video frame extraction failed: {0}")]
    Video(String),

    #[error("worker task failed: {0}")]
    Task(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}
