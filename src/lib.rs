//! Semantic file organiser: sorts text, image and video files into directories
//! by embedding similarity, and keeps a reversible log of every move.
//!
//! Each destination directory is summarised by a *prototype*: the normalized mean
//! embedding of a sample of its files, cached on disk per content mode. A file is
//! embedded once, compared against every prototype, and moved into the best match
//! if the similarity clears a threshold.
//!
//! | Mode | Extensions | Embedded as |
//! |------|------------|-------------|
//! | **Text** | txt, md, rst, html, json | mean of up to N text chunks |
//! | **Image** | png, jpg, jpeg, bmp, gif, webp | single image |
//! | **Video** | mp4, mkv, webm | mean of N sampled frames |
//!
//! # Architecture
//!
//! - **Embeddings**: Local ONNX Runtime (all-MiniLM-L6-v2, CLIP ViT-B/32, DINOv2-small)
//! - **Engine**: memory-aware batch runner over tokio's blocking pool
//! - **History**: SQLite log of `(scan_id, file_id, source, destination, timestamp)`
//! - **Index**: [sqlite-vec](https://github.com/asg017/sqlite-vec) collections per content mode
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`embedding`]: Embedding provider trait, model registry, ONNX providers
//! - [`analysis`]: Content modes, prototypes, and file-to-directory comparison
//! - [`processor`]: Batch engine, memory manager, and listener interface
//! - [`organiser`]: Classifier and scanner batch processors
//! - [`indexer`]: Vector store indexing batch processor
//! - [`history`]: Scan history database and restore
//! - [`store`]: Vector store trait and sqlite-vec implementation
//! - [`files`]: Directory listing and move primitives

pub mod analysis;
pub mod config;
pub mod embedding;
pub mod error;
pub mod files;
pub mod history;
pub mod indexer;
pub mod organiser;
pub mod processor;
pub mod store;

pub use error::{Error, Result};
