//! Local ONNX Runtime image embedding provider.
//!
//! Resizes to the model's square input, normalizes per channel, lays the batch
//! out as NCHW `pixel_values`, and L2-normalizes whichever embedding the export
//! provides (`image_embeds`, `pooler_output`, or the CLS token of `last_hidden_state`).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use image::imageops::FilterType;
use image::DynamicImage;
use ort::session::Session;
use ort::value::Tensor;

use super::{l2_normalize, EmbeddingProvider, ImagePreset, ModelSpec};
use crate::error::{Error, Result};

pub struct OnnxImageEmbedder {
    spec: &'static ModelSpec,
    preset: ImagePreset,
    model_path: PathBuf,
    session: Mutex<Option<Session>>,
}

// Safety: Session is only reached through the Mutex, which guarantees
// exclusive access during run().
unsafe impl Send for OnnxImageEmbedder {}
unsafe impl Sync for OnnxImageEmbedder {}

impl OnnxImageEmbedder {
    pub fn new(spec: &'static ModelSpec, preset: ImagePreset, cache_dir: &Path) -> Self {
        Self {
            spec,
            preset,
            model_path: spec.model_dir(cache_dir).join("model.onnx"),
            session: Mutex::new(None),
        }
    }

    fn load(&self) -> anyhow::Result<Session> {
        anyhow::ensure!(
            self.model_path.exists(),
            "ONNX model not found at {}. Run `smartscan model download` first.",
            self.model_path.display()
        );
        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&self.model_path)
            .context("failed to load ONNX model")?;
        tracing::info!(model = %self.model_path.display(), "ONNX image model loaded");
        Ok(session)
    }

    fn run(&self, session: &mut Session, images: &[&DynamicImage]) -> anyhow::Result<Vec<Vec<f32>>> {
        let size = self.spec.input_size;
        let mut pixels = Vec::with_capacity(images.len() * 3 * size * size);
        for image in images {
            pixels.extend(preprocess(image, size, self.preset));
        }

        let shape = vec![images.len() as i64, 3, size as i64, size as i64];
        let pixel_tensor = Tensor::from_array((shape, pixels.into_boxed_slice()))?;

        let outputs = session.run(ort::inputs! {
            "pixel_values" => pixel_tensor,
        })?;

        let value = outputs
            .get("image_embeds")
            .or_else(|| outputs.get("pooler_output"))
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract image embedding tensor")?;

        let dim = self.spec.dimensions;
        let dims: &[i64] = &shape;
        match dims.len() {
            2 => {
                anyhow::ensure!(
                    dims[1] == dim as i64,
                    "unexpected embedding shape: {dims:?}, expected [batch, {dim}]"
                );
                Ok(data.chunks(dim).map(l2_normalize).collect())
            }
            3 => {
                anyhow::ensure!(
                    dims[2] == dim as i64,
                    "unexpected hidden state shape: {dims:?}, expected [batch, tokens, {dim}]"
                );
                let stride = dims[1] as usize * dim;
                // CLS token sits at position 0 of each sequence
                Ok(data
                    .chunks(stride)
                    .map(|seq| l2_normalize(&seq[..dim]))
                    .collect())
            }
            _ => anyhow::bail!("unexpected image output rank: {dims:?}"),
        }
    }
}

/// Resize to `size`x`size`, scale to [0, 1], normalize per channel, and emit CHW order.
pub(crate) fn preprocess(image: &DynamicImage, size: usize, preset: ImagePreset) -> Vec<f32> {
    let rgb = image
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8();
    let mean = preset.mean();
    let std = preset.std();
    let plane = size * size;
    let mut out = vec![0.0f32; 3 * plane];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }
    out
}

impl EmbeddingProvider<DynamicImage> for OnnxImageEmbedder {
    fn init(&self) -> Result<()> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| Error::ModelLoad(format!("session lock poisoned: {e}")))?;
        if session.is_none() {
            *session = Some(self.load().map_err(|e| Error::ModelLoad(format!("{e:#}")))?);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn close(&self) {
        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }
    }

    fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    fn embed_batch(&self, images: &[&DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(vec![]);
        }
        let mut guard = self
            .session
            .lock()
            .map_err(|e| Error::Inference(format!("session lock poisoned: {e}")))?;
        let session = guard
            .as_mut()
            .ok_or_else(|| Error::ModelNotLoaded(self.spec.name.to_string()))?;
        self.run(session, images)
            .map_err(|e| Error::Inference(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::lookup_model;
    use image::{Rgb, RgbImage};

    #[test]
    fn preprocess_is_chw_and_normalized() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let out = preprocess(&img, 4, ImagePreset::ImageNet);
        assert_eq!(out.len(), 3 * 16);

        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        assert!((out[0] - red).abs() < 1e-4);
        assert!((out[15] - red).abs() < 1e-4);
        assert!((out[16] - green).abs() < 1e-4);
    }

    #[test]
    fn embed_before_init_is_model_not_loaded() {
        let spec = lookup_model("dinov2-small").unwrap();
        let provider = OnnxImageEmbedder::new(spec, ImagePreset::ImageNet, Path::new("/nonexistent"));
        let img = DynamicImage::new_rgb8(2, 2);
        assert!(matches!(provider.embed(&img), Err(Error::ModelNotLoaded(_))));
        assert!(matches!(provider.init(), Err(Error::ModelLoad(_))));
    }

    #[test]
    #[ignore] // Requires model files, run with: cargo test -- --ignored
    fn test_embed_produces_unit_vectors() {
        let spec = lookup_model("dinov2-small").unwrap();
        let provider = OnnxImageEmbedder::new(
            spec,
            ImagePreset::ImageNet,
            &crate::config::default_smartscan_dir().join("models"),
        );
        provider.init().unwrap();
        let a = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([200, 10, 10])));
        let b = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([10, 10, 200])));
        let embs = provider.embed_batch(&[&a, &b]).unwrap();
        assert_eq!(embs.len(), 2);
        for emb in &embs {
            assert_eq!(emb.len(), 384);
            let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }
}
