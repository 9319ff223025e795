//! Vector store for indexed file embeddings.
//!
//! [`VectorStore`] is the seam the indexer writes through; [`SqliteVecStore`]
//! keeps one sqlite-vec `vec0` table per (model, content mode) collection.

pub mod sqlite;

pub use sqlite::{collection_name, SqliteVecStore};

use crate::error::Result;

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub distance: f64,
}

pub trait VectorStore: Send + Sync {
    /// Insert or replace embeddings by id. `ids` and `embeddings` are parallel.
    fn add(&self, ids: &[String], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Stored embeddings for the ids that exist, in input order.
    fn get(&self, ids: &[String]) -> Result<Vec<(String, Vec<f32>)>>;

    /// For each query vector, up to `n` closest entries by ascending distance.
    fn query(&self, embeddings: &[Vec<f32>], n: usize) -> Result<Vec<Vec<QueryMatch>>>;

    fn contains(&self, id: &str) -> Result<bool>;
}
