//! Filesystem helpers: directory lists, file discovery, and the move primitive.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::analysis::ContentMode;
use crate::error::{Error, Result};

/// `path` made absolute against the current directory, without touching the
/// filesystem. Falls back to `path` unchanged if the current directory is unknown.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Read a newline-separated list of directories. Blank lines are ignored and
/// entries that are not directories are skipped with a warning.
pub fn load_dir_list(dirlist_file: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(dirlist_file)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let dir = absolute(Path::new(line));
            if dir.is_dir() {
                Some(dir)
            } else {
                tracing::warn!(path = %dir.display(), "not a directory, skipping");
                None
            }
        })
        .collect())
}

/// Non-hidden immediate subdirectories of each of `dirs`, sorted and absolute.
pub fn child_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for dir in dirs {
        for entry in std::fs::read_dir(absolute(dir))? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() {
                children.push(entry.path());
            }
        }
    }
    children.sort();
    Ok(children)
}

/// Supported, non-hidden files directly inside each of `dirs` (not recursive),
/// sorted and absolute.
pub fn files_in_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in dirs {
        for entry in std::fs::read_dir(absolute(dir))? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_file() && ContentMode::from_path(&path).is_ok() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Files of `mode` anywhere under `dir`, skipping hidden entries, sorted, at most `limit`.
pub fn eligible_files(dir: &Path, mode: ContentMode, limit: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && mode.matches(e.path()))
        .map(|e| e.into_path())
        .take(limit)
        .collect();
    files.sort();
    files
}

pub fn read_text_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::InvalidFile(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Move `src` into `dir`, keeping its file name. Returns the new path.
pub fn move_into_dir(src: &Path, dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(Error::InvalidDirectory(dir.to_path_buf()));
    }
    let name = src
        .file_name()
        .ok_or_else(|| Error::InvalidFile(src.to_path_buf()))?;
    let dst = dir.join(name);
    move_to_path(src, &dst)?;
    Ok(dst)
}

/// Move `src` to exactly `dst`. Never overwrites an existing file. Falls back to
/// copy and remove when a rename crosses filesystems.
pub fn move_to_path(src: &Path, dst: &Path) -> Result<()> {
    let fail = |reason: String| Error::MoveFailed {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        reason,
    };
    if !src.is_file() {
        return Err(Error::InvalidFile(src.to_path_buf()));
    }
    if dst.exists() {
        return Err(fail("destination already exists".into()));
    }
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dst).map_err(|e| fail(e.to_string()))?;
    if let Err(e) = std::fs::remove_file(src) {
        let _ = std::fs::remove_file(dst);
        return Err(fail(e.to_string()));
    }
    Ok(())
}
