use std::path::Path;
use std::sync::{Mutex, MutexGuard, Once};

use rusqlite::{params, Connection, OptionalExtension};
use sqlite_vec::sqlite3_vec_init;

use super::{QueryMatch, VectorStore};
use crate::error::{Error, Result};

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            std::mem::size_of_val(embedding),
        )
    }
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Table name for a model's collection of one content mode, e.g. `dinov2_small_image_collection`.
pub fn collection_name(model: &str, mode: &str) -> String {
    sanitize(&format!("{model}_{mode}_collection"))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// One sqlite-vec collection with fixed dimensions.
pub struct SqliteVecStore {
    conn: Mutex<Connection>,
    table: String,
    dimensions: usize,
}

impl SqliteVecStore {
    /// Open (or create) the collection `name` in the database at `path`.
    pub fn open(path: impl AsRef<Path>, name: &str, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        load_sqlite_vec();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, name, dimensions)
    }

    pub fn open_in_memory(name: &str, dimensions: usize) -> Result<Self> {
        load_sqlite_vec();
        Self::with_connection(Connection::open_in_memory()?, name, dimensions)
    }

    fn with_connection(conn: Connection, name: &str, dimensions: usize) -> Result<Self> {
        let table = sanitize(name);
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(
                id TEXT PRIMARY KEY,
                embedding FLOAT[{dimensions}]
            );"
        ))?;
        tracing::debug!(table = %table, dimensions, "vector collection ready");
        Ok(Self {
            conn: Mutex::new(conn),
            table,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Task(format!("vector store lock poisoned: {e}")))
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl VectorStore for SqliteVecStore {
    fn add(&self, ids: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
        if ids.len() != embeddings.len() {
            return Err(Error::DimensionMismatch {
                expected: ids.len(),
                actual: embeddings.len(),
            });
        }
        for embedding in embeddings {
            self.check_dimensions(embedding)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", self.table))?;
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (id, embedding) VALUES (?1, ?2)",
                self.table
            ))?;
            for (id, embedding) in ids.iter().zip(embeddings) {
                delete.execute(params![id])?;
                insert.execute(params![id, embedding_to_bytes(embedding)])?;
            }
        }
        tx.commit()?;
        tracing::debug!(table = %self.table, count = ids.len(), "embeddings upserted");
        Ok(())
    }

    fn get(&self, ids: &[String]) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT embedding FROM {} WHERE id = ?1",
            self.table
        ))?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let bytes: Option<Vec<u8>> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
            if let Some(bytes) = bytes {
                found.push((id.clone(), bytes_to_embedding(&bytes)));
            }
        }
        Ok(found)
    }

    fn query(&self, embeddings: &[Vec<f32>], n: usize) -> Result<Vec<Vec<QueryMatch>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, distance FROM {} \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
            self.table
        ))?;
        let mut results = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            self.check_dimensions(embedding)?;
            let matches = stmt
                .query_map(params![embedding_to_bytes(embedding), n as i64], |row| {
                    Ok(QueryMatch {
                        id: row.get(0)?,
                        distance: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            results.push(matches);
        }
        Ok(results)
    }

    fn contains(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", self.table),
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
