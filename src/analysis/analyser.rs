use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::DynamicImage;

use super::mode::ContentMode;
use super::prototype::{
    chunk_text, days_since_modified, load_prototype, mean_prototype, save_prototype,
    TEXT_CHUNK_CHARS,
};
use crate::config::OrganiserConfig;
use crate::embedding::{dot, video, ImageEmbeddingProvider, TextEmbeddingProvider};
use crate::error::{Error, Result};
use crate::files;

/// Files embedded per `embed_batch` call while building a prototype.
const PROTOTYPE_CHUNK_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct AnalyserSettings {
    pub max_files_for_prototypes: usize,
    pub refresh_prototype_days: u64,
    pub n_frames: usize,
    pub n_chunks: usize,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self::from(&OrganiserConfig::default())
    }
}

impl From<&OrganiserConfig> for AnalyserSettings {
    fn from(config: &OrganiserConfig) -> Self {
        Self {
            max_files_for_prototypes: config.max_files_for_prototypes,
            refresh_prototype_days: config.refresh_prototype_days,
            n_frames: config.n_frames,
            n_chunks: config.n_chunks,
        }
    }
}

/// Model input for one file, before it reaches a provider.
enum Prepared {
    Text(Vec<String>),
    Images(Vec<DynamicImage>),
}

impl Prepared {
    fn len(&self) -> usize {
        match self {
            Self::Text(chunks) => chunks.len(),
            Self::Images(images) => images.len(),
        }
    }
}

/// Compares files to each other and to directory prototypes.
///
/// All methods are blocking. Prototype load-or-build is serialized per
/// (directory, mode), so concurrent callers share one build.
pub struct FileAnalyser {
    text: Arc<TextEmbeddingProvider>,
    image: Arc<ImageEmbeddingProvider>,
    settings: AnalyserSettings,
    prototype_locks: Mutex<HashMap<(PathBuf, ContentMode), Arc<Mutex<()>>>>,
}

impl FileAnalyser {
    pub fn new(
        text: Arc<TextEmbeddingProvider>,
        image: Arc<ImageEmbeddingProvider>,
        settings: AnalyserSettings,
    ) -> Self {
        Self {
            text,
            image,
            settings,
            prototype_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    /// Fails with [`Error::ModelNotLoaded`] unless both providers are initialized.
    pub fn ensure_ready(&self) -> Result<()> {
        if !self.text.is_initialized() {
            return Err(Error::ModelNotLoaded("text embedding provider".into()));
        }
        if !self.image.is_initialized() {
            return Err(Error::ModelNotLoaded("image embedding provider".into()));
        }
        Ok(())
    }

    fn dimensions(&self, mode: ContentMode) -> usize {
        match mode {
            ContentMode::Text => self.text.dimensions(),
            ContentMode::Image | ContentMode::Video => self.image.dimensions(),
        }
    }

    /// Cosine similarity between two files of the same content mode.
    pub fn compare_files(&self, a: &Path, b: &Path) -> Result<f32> {
        let mode = ContentMode::from_path(a)?;
        let other = ContentMode::from_path(b)?;
        if mode != other {
            return Err(Error::UnsupportedFileType(format!(
                "{} is {mode} but {} is {other}",
                a.display(),
                b.display()
            )));
        }
        let embeddings = self.embed_files(&[a, b], mode)?;
        dot(&embeddings[0], &embeddings[1])
    }

    pub fn compare_file_to_dir(&self, file: &Path, dir: &Path) -> Result<f32> {
        let mode = ContentMode::from_path(file)?;
        let embedding = self.embed_file(file, mode)?;
        self.compare_embedding_to_dir(&embedding, dir, mode)
    }

    /// Similarity of `file` to every directory in `dirs`. Directories whose
    /// prototype cannot be built or compared are skipped with a warning.
    pub fn compare_file_to_dirs(&self, file: &Path, dirs: &[PathBuf]) -> Result<BTreeMap<PathBuf, f32>> {
        let mode = ContentMode::from_path(file)?;
        let embedding = self.embed_file(file, mode)?;
        let mut similarities = BTreeMap::new();
        for dir in dirs {
            match self.compare_embedding_to_dir(&embedding, dir, mode) {
                Ok(similarity) => {
                    similarities.insert(dir.clone(), similarity);
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping directory");
                }
            }
        }
        Ok(similarities)
    }

    /// Compare an embedding against `dir`'s prototype for `mode`, loading the
    /// cached prototype when fresh and rebuilding (and persisting) it otherwise.
    pub fn compare_embedding_to_dir(&self, embedding: &[f32], dir: &Path, mode: ContentMode) -> Result<f32> {
        let prototype = self.prototype_for_dir(dir, mode)?;
        dot(embedding, &prototype)
    }

    fn prototype_lock(&self, dir: &Path, mode: ContentMode) -> Arc<Mutex<()>> {
        let mut locks = self
            .prototype_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry((dir.to_path_buf(), mode)).or_default())
    }

    fn prototype_for_dir(&self, dir: &Path, mode: ContentMode) -> Result<Vec<f32>> {
        if !dir.is_dir() {
            return Err(Error::InvalidDirectory(dir.to_path_buf()));
        }
        let lock = self.prototype_lock(dir, mode);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = dir.join(mode.prototype_file_name());
        if path.exists() {
            match self.is_prototype_stale(&path) {
                Ok(false) => match load_prototype(&path) {
                    Ok(prototype) if prototype.len() == self.dimensions(mode) => {
                        tracing::debug!(path = %path.display(), "using cached prototype");
                        return Ok(prototype);
                    }
                    Ok(prototype) => tracing::warn!(
                        path = %path.display(),
                        cached = prototype.len(),
                        expected = self.dimensions(mode),
                        "cached prototype has wrong dimensions, rebuilding"
                    ),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "unreadable cached prototype, rebuilding"
                    ),
                },
                Ok(true) => tracing::debug!(path = %path.display(), "prototype is stale"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot stat prototype"),
            }
        }

        let prototype = self.generate_prototype_for_dir(dir, mode)?;
        save_prototype(&path, &prototype)?;
        tracing::info!(dir = %dir.display(), mode = %mode, "prototype saved");
        Ok(prototype)
    }

    /// Build the prototype of `dir` from up to `max_files_for_prototypes` files of `mode`.
    /// Files that cannot be read are skipped.
    pub fn generate_prototype_for_dir(&self, dir: &Path, mode: ContentMode) -> Result<Vec<f32>> {
        let files = files::eligible_files(dir, mode, self.settings.max_files_for_prototypes);
        let mut embeddings = Vec::with_capacity(files.len());

        for chunk in files.chunks(PROTOTYPE_CHUNK_SIZE) {
            let prepared: Vec<Prepared> = chunk
                .iter()
                .filter_map(|file| match self.prepare(file, mode) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::warn!(path = %file.display(), error = %e, "skipping unreadable file");
                        None
                    }
                })
                .collect();
            if prepared.is_empty() {
                continue;
            }
            embeddings.extend(self.embed_prepared(&prepared, mode)?);
        }

        if embeddings.is_empty() {
            return Err(Error::EmptyDirectory {
                dir: dir.to_path_buf(),
                mode: mode.to_string(),
            });
        }
        tracing::debug!(dir = %dir.display(), mode = %mode, files = embeddings.len(), "built prototype");
        mean_prototype(&embeddings)
    }

    pub fn is_prototype_stale(&self, path: &Path) -> Result<bool> {
        Ok(days_since_modified(path)? > self.settings.refresh_prototype_days)
    }

    /// Remove every mode's cached prototype from each of `dirs`. Returns how many were removed.
    pub fn clear_prototypes(&self, dirs: &[PathBuf]) -> Result<usize> {
        let mut removed = 0;
        for dir in dirs {
            for mode in ContentMode::ALL {
                let path = dir.join(mode.prototype_file_name());
                if path.exists() {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        tracing::info!(removed, "cleared prototypes");
        Ok(removed)
    }

    pub fn embed_file(&self, path: &Path, mode: ContentMode) -> Result<Vec<f32>> {
        self.embed_files(&[path], mode)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("provider returned an empty batch".into()))
    }

    /// Embed several files of one mode with a single provider call.
    pub fn embed_files(&self, paths: &[&Path], mode: ContentMode) -> Result<Vec<Vec<f32>>> {
        let prepared = paths
            .iter()
            .map(|p| self.prepare(p, mode))
            .collect::<Result<Vec<_>>>()?;
        self.embed_prepared(&prepared, mode)
    }

    fn prepare(&self, path: &Path, mode: ContentMode) -> Result<Prepared> {
        match mode {
            ContentMode::Text => {
                let text = files::read_text_file(path)?;
                Ok(Prepared::Text(chunk_text(
                    &text,
                    TEXT_CHUNK_CHARS,
                    self.settings.n_chunks,
                )))
            }
            ContentMode::Image => Ok(Prepared::Images(vec![image::open(path)?])),
            ContentMode::Video => Ok(Prepared::Images(video::extract_frames(
                path,
                self.settings.n_frames,
            )?)),
        }
    }

    /// Flatten every file's inputs into one batch, then average each file's share.
    fn embed_prepared(&self, prepared: &[Prepared], mode: ContentMode) -> Result<Vec<Vec<f32>>> {
        let flat = match mode {
            ContentMode::Text => {
                let inputs: Vec<&str> = prepared
                    .iter()
                    .flat_map(|p| match p {
                        Prepared::Text(chunks) => chunks.iter().map(String::as_str).collect(),
                        Prepared::Images(_) => Vec::new(),
                    })
                    .collect();
                self.text.embed_batch(&inputs)?
            }
            ContentMode::Image | ContentMode::Video => {
                let inputs: Vec<&DynamicImage> = prepared
                    .iter()
                    .flat_map(|p| match p {
                        Prepared::Images(images) => images.iter().collect(),
                        Prepared::Text(_) => Vec::new(),
                    })
                    .collect();
                self.image.embed_batch(&inputs)?
            }
        };

        let expected: usize = prepared.iter().map(Prepared::len).sum();
        if flat.len() != expected {
            return Err(Error::Inference(format!(
                "provider returned {} embeddings for {expected} inputs",
                flat.len()
            )));
        }

        let mut offset = 0;
        prepared
            .iter()
            .map(|p| {
                let share = &flat[offset..offset + p.len()];
                offset += p.len();
                mean_prototype(share)
            })
            .collect()
    }
}

/// Directory with the highest similarity. Ties go to the lexicographically
/// smallest path; non-finite scores are ignored.
pub fn best_match(similarities: &BTreeMap<PathBuf, f32>) -> Option<(PathBuf, f32)> {
    let mut best: Option<(&PathBuf, f32)> = None;
    for (dir, &similarity) in similarities {
        if !similarity.is_finite() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, top)) => similarity > top,
        };
        if better {
            best = Some((dir, similarity));
        }
    }
    best.map(|(dir, similarity)| (dir.clone(), similarity))
}
