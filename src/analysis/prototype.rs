//! Prototype math and on-disk persistence.
//!
//! A prototype is the normalized mean of a set of unit embeddings. It is cached
//! per (directory, mode) as a small bincode file, written atomically.

use std::path::Path;
use std::time::SystemTime;

use crate::embedding::l2_normalize;
use crate::error::{Error, Result};

/// Maximum characters per text chunk fed to the text model.
pub const TEXT_CHUNK_CHARS: usize = 512;

/// Mean of `embeddings`, re-normalized to unit length.
pub fn mean_prototype(embeddings: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = embeddings
        .first()
        .ok_or_else(|| Error::Inference("cannot average zero embeddings".into()))?;
    let dim = first.len();
    let mut sum = vec![0.0f32; dim];
    for embedding in embeddings {
        if embedding.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: embedding.len(),
            });
        }
        for (acc, v) in sum.iter_mut().zip(embedding) {
            *acc += v;
        }
    }
    let n = embeddings.len() as f32;
    sum.iter_mut().for_each(|v| *v /= n);
    Ok(l2_normalize(&sum))
}

/// Write a prototype to `path` via a uniquely named temp file and rename.
pub fn save_prototype(path: &Path, prototype: &[f32]) -> Result<()> {
    let bytes = bincode::serialize(prototype)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!("{file_name}.{}.tmp", uuid::Uuid::now_v7()));
    std::fs::write(&tmp, &bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn load_prototype(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Whole days since `path` was last modified.
pub fn days_since_modified(path: &Path) -> Result<u64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    Ok(age.as_secs() / 86_400)
}

/// Split text into at most `limit` chunks of up to `max_chars` characters,
/// breaking at the last whitespace inside each window where possible.
/// Always returns at least one (possibly empty) chunk.
pub fn chunk_text(text: &str, max_chars: usize, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while chunks.len() < limit.max(1) {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }
        let window_end = start + max_chars;
        let (end, next) = if window_end >= chars.len() {
            (chars.len(), chars.len())
        } else {
            match chars[start..window_end].iter().rposition(|c| c.is_whitespace()) {
                Some(pos) if pos > 0 => (start + pos, start + pos + 1),
                _ => (window_end, window_end),
            }
        };
        chunks.push(chars[start..end].iter().collect::<String>().trim_end().to_string());
        start = next;
    }

    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_uses_every_embedding() {
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]];
        let p = mean_prototype(&embeddings).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((p[0] - expected).abs() < 1e-6);
        assert!((p[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn mean_rejects_empty_and_ragged_input() {
        assert!(mean_prototype(&[]).is_err());
        assert!(matches!(
            mean_prototype(&[vec![1.0, 0.0], vec![1.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".text_prototype_embedding.bin");
        save_prototype(&path, &[0.6, 0.8]).unwrap();
        assert_eq!(load_prototype(&path).unwrap(), vec![0.6, 0.8]);
        // no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(days_since_modified(&path).unwrap(), 0);
    }

    #[test]
    fn chunks_break_on_whitespace() {
        let chunks = chunk_text("alpha beta gamma delta", 11, 10);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn chunks_respect_limit_and_size() {
        let text = "word ".repeat(1000);
        let chunks = chunk_text(&text, TEXT_CHUNK_CHARS, 5);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= TEXT_CHUNK_CHARS));
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let chunks = chunk_text(&"x".repeat(25), 10, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "xxxxx");
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        assert_eq!(chunk_text("   \n ", 512, 5), vec![String::new()]);
    }
}
