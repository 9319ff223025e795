use std::path::{Path, PathBuf};

use super::ScanHistoryDb;
use crate::error::Result;
use crate::files;

#[derive(Debug, Default)]
pub struct RestoreReport {
    /// `(from, to)` for every file moved back.
    pub restored: Vec<(PathBuf, PathBuf)>,
    /// Files left alone, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl RestoreReport {
    fn skip(&mut self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(path = %path.display(), reason = %reason, "not restored");
        self.skipped.push((path.to_path_buf(), reason));
    }
}

/// Move each file back to where it was before it was first sorted.
///
/// Relative paths are resolved against the current directory before lookup.
/// Missing parent directories are recreated. Nothing is overwritten and no
/// history rows are written.
pub fn restore_files(db: &ScanHistoryDb, files: &[PathBuf]) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();
    for file in files {
        let file = &files::absolute(file);
        let Some(original) = db.get_original_source(file)? else {
            report.skip(file, "no move history");
            continue;
        };
        if !file.is_file() {
            report.skip(file, "file no longer exists");
            continue;
        }
        if let Some(parent) = original.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                report.skip(file, format!("cannot create {}: {e}", parent.display()));
                continue;
            }
        }
        match files::move_to_path(file, &original) {
            Ok(()) => {
                tracing::info!(from = %file.display(), to = %original.display(), "restored");
                report.restored.push((file.clone(), original));
            }
            Err(e) => report.skip(file, e.to_string()),
        }
    }
    Ok(report)
}
