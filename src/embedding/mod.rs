//! Content-to-vector embedding providers.
//!
//! Provides the [`EmbeddingProvider`] trait, a registry of the supported ONNX models,
//! and local implementations for text ([`text::OnnxTextEmbedder`]) and images
//! ([`image::OnnxImageEmbedder`]). Video is embedded through the image provider
//! from sampled frames (see [`video`]). Providers are created from configuration
//! via [`create_text_provider`] and [`create_image_provider`].

pub mod image;
pub mod text;
pub mod video;

use std::path::{Path, PathBuf};

use ::image::DynamicImage;
use anyhow::Result as AnyResult;

use crate::config::ModelsConfig;
use crate::error::{Error, Result};

/// Trait for embedding items of type `T` into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`dimensions`](Self::dimensions)
/// entries, in the same order as their input. All methods are synchronous; callers in
/// async contexts should use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider<T: ?Sized>: Send + Sync {
    /// Load the model. Idempotent.
    fn init(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Release the model session. Later `embed*` calls fail with [`Error::ModelNotLoaded`].
    fn close(&self);

    fn dimensions(&self) -> usize;

    /// Embed a batch of items.
    fn embed_batch(&self, items: &[&T]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single item.
    fn embed(&self, item: &T) -> Result<Vec<f32>> {
        self.embed_batch(&[item])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("provider returned an empty batch".into()))
    }
}

pub type TextEmbeddingProvider = dyn EmbeddingProvider<str>;
pub type ImageEmbeddingProvider = dyn EmbeddingProvider<DynamicImage>;

/// How a registered model turns network output into one vector per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Sentence transformer: attention-masked mean over token embeddings.
    TextMeanPooled,
    /// Model that already emits one pooled vector per sequence (CLIP text tower).
    TextPooled,
    /// Vision model fed `[batch, 3, size, size]` pixel values.
    Image(ImagePreset),
}

/// Per-channel normalization used when preparing pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePreset {
    Clip,
    ImageNet,
}

impl ImagePreset {
    pub fn mean(&self) -> [f32; 3] {
        match self {
            Self::Clip => [0.481_454_66, 0.457_827_5, 0.408_210_73],
            Self::ImageNet => [0.485, 0.456, 0.406],
        }
    }

    pub fn std(&self) -> [f32; 3] {
        match self {
            Self::Clip => [0.268_629_54, 0.261_302_58, 0.275_777_11],
            Self::ImageNet => [0.229, 0.224, 0.225],
        }
    }
}

/// A model the local providers know how to run.
#[derive(Debug)]
pub struct ModelSpec {
    pub name: &'static str,
    pub kind: ModelKind,
    pub dimensions: usize,
    /// Maximum token length (text) or square input size in pixels (image).
    pub input_size: usize,
    pub model_url: &'static str,
    pub tokenizer_url: Option<&'static str>,
}

impl ModelSpec {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ModelKind::TextMeanPooled | ModelKind::TextPooled)
    }

    /// Directory holding `model.onnx` (and `tokenizer.json` for text models).
    pub fn model_dir(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(self.name)
    }
}

pub const MODEL_REGISTRY: &[ModelSpec] = &[
    ModelSpec {
        name: "all-minilm-l6-v2",
        kind: ModelKind::TextMeanPooled,
        dimensions: 384,
        input_size: 256,
        model_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx",
        tokenizer_url: Some(
            "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json",
        ),
    },
    ModelSpec {
        name: "clip-vit-b-32-text",
        kind: ModelKind::TextPooled,
        dimensions: 512,
        input_size: 77,
        model_url: "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/text_model.onnx",
        tokenizer_url: Some(
            "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/tokenizer.json",
        ),
    },
    ModelSpec {
        name: "clip-vit-b-32-image",
        kind: ModelKind::Image(ImagePreset::Clip),
        dimensions: 512,
        input_size: 224,
        model_url: "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/vision_model.onnx",
        tokenizer_url: None,
    },
    ModelSpec {
        name: "dinov2-small",
        kind: ModelKind::Image(ImagePreset::ImageNet),
        dimensions: 384,
        input_size: 224,
        model_url: "https://huggingface.co/Xenova/dinov2-small/resolve/main/onnx/model.onnx",
        tokenizer_url: None,
    },
];

/// Look up a registered model by name.
pub fn lookup_model(name: &str) -> AnyResult<&'static ModelSpec> {
    MODEL_REGISTRY
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| {
            let known: Vec<&str> = MODEL_REGISTRY.iter().map(|s| s.name).collect();
            anyhow::anyhow!("unknown model: {name}. Supported: {}", known.join(", "))
        })
}

/// Create the configured text embedding provider. The provider is not initialized.
pub fn create_text_provider(config: &ModelsConfig) -> AnyResult<Box<TextEmbeddingProvider>> {
    let spec = lookup_model(&config.text_model)?;
    anyhow::ensure!(spec.is_text(), "{} is not a text model", spec.name);
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    Ok(Box::new(text::OnnxTextEmbedder::new(spec, &cache_dir)))
}

/// Create the configured image embedding provider. The provider is not initialized.
pub fn create_image_provider(config: &ModelsConfig) -> AnyResult<Box<ImageEmbeddingProvider>> {
    let spec = lookup_model(&config.image_model)?;
    let ModelKind::Image(preset) = spec.kind else {
        anyhow::bail!("{} is not an image model", spec.name);
    };
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    Ok(Box::new(image::OnnxImageEmbedder::new(spec, preset, &cache_dir)))
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Dot product; equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let normalized = l2_normalize(&v);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let v = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&v), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn dot_rejects_mismatched_lengths() {
        let err = dot(&[1.0, 0.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn registry_resolves_known_models() {
        let minilm = lookup_model("all-minilm-l6-v2").unwrap();
        assert_eq!(minilm.dimensions, 384);
        assert!(minilm.is_text());

        let dino = lookup_model("dinov2-small").unwrap();
        assert_eq!(dino.kind, ModelKind::Image(ImagePreset::ImageNet));
        assert!(dino.tokenizer_url.is_none());

        assert!(lookup_model("resnet").is_err());
    }

    #[test]
    fn factory_rejects_wrong_role() {
        let config = ModelsConfig {
            text_model: "dinov2-small".into(),
            image_model: "all-minilm-l6-v2".into(),
            cache_dir: "/tmp/models".into(),
        };
        assert!(create_text_provider(&config).is_err());
        assert!(create_image_provider(&config).is_err());
    }
}
