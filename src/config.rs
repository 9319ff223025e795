use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SmartScanConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub models: ModelsConfig,
    pub organiser: OrganiserConfig,
    pub processor: ProcessorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub history_db: String,
    pub vector_db: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    pub text_model: String,
    pub image_model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrganiserConfig {
    pub similarity_threshold: f32,
    pub target_dirs: Vec<String>,
    pub max_files_for_prototypes: usize,
    pub refresh_prototype_days: u64,
    pub n_frames: usize,
    pub n_chunks: usize,
}

/// Batch engine tuning. Memory thresholds are in megabytes of available system memory.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessorConfig {
    pub batch_size: usize,
    pub low_memory_mb: u64,
    pub high_memory_mb: u64,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_smartscan_dir();
        Self {
            history_db: dir.join("scan_history.db").to_string_lossy().into_owned(),
            vector_db: dir.join("vectors.db").to_string_lossy().into_owned(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let cache_dir = default_smartscan_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            text_model: "all-minilm-l6-v2".into(),
            image_model: "dinov2-small".into(),
            cache_dir,
        }
    }
}

impl Default for OrganiserConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            target_dirs: Vec::new(),
            max_files_for_prototypes: 30,
            refresh_prototype_days: 7,
            n_frames: 10,
            n_chunks: 5,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            low_memory_mb: 400,
            high_memory_mb: 1600,
            min_concurrency: 1,
            max_concurrency: 8,
        }
    }
}

/// Returns `~/.smartscan/`, or `./.smartscan/` when no home directory is known.
pub fn default_smartscan_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartscan")
}

/// Returns the default config file path: `~/.smartscan/config.toml`
pub fn default_config_path() -> PathBuf {
    default_smartscan_dir().join("config.toml")
}

impl SmartScanConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SmartScanConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SMARTSCAN_HISTORY_DB") {
            self.storage.history_db = val;
        }
        if let Ok(val) = std::env::var("SMARTSCAN_VECTOR_DB") {
            self.storage.vector_db = val;
        }
        if let Ok(val) = std::env::var("SMARTSCAN_MODELS_DIR") {
            self.models.cache_dir = val;
        }
        if let Ok(val) = std::env::var("SMARTSCAN_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn resolved_history_db(&self) -> PathBuf {
        expand_tilde(&self.storage.history_db)
    }

    pub fn resolved_vector_db(&self) -> PathBuf {
        expand_tilde(&self.storage.vector_db)
    }

    pub fn resolved_models_dir(&self) -> PathBuf {
        expand_tilde(&self.models.cache_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
