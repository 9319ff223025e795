//! Local ONNX Runtime text embedding provider.
//!
//! Runs either a sentence transformer (all-MiniLM-L6-v2, mean pooled) or the
//! CLIP text tower (pooled `text_embeds`) via `ort`. Handles tokenization,
//! inference, pooling, and L2 normalization.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, ModelKind, ModelSpec};
use crate::error::{Error, Result};

struct Loaded {
    session: Session,
    tokenizer: Tokenizer,
}

/// Local ONNX-based text embedding provider.
pub struct OnnxTextEmbedder {
    spec: &'static ModelSpec,
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    state: Mutex<Option<Loaded>>,
}

// Safety: Tokenizer is Send+Sync. Session is only reached through the Mutex,
// which guarantees exclusive access during run().
unsafe impl Send for OnnxTextEmbedder {}
unsafe impl Sync for OnnxTextEmbedder {}

impl OnnxTextEmbedder {
    pub fn new(spec: &'static ModelSpec, cache_dir: &Path) -> Self {
        let dir = spec.model_dir(cache_dir);
        Self {
            spec,
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
            state: Mutex::new(None),
        }
    }

    fn load(&self) -> anyhow::Result<Loaded> {
        anyhow::ensure!(
            self.model_path.exists(),
            "ONNX model not found at {}. Run `smartscan model download` first.",
            self.model_path.display()
        );
        anyhow::ensure!(
            self.tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `smartscan model download` first.",
            self.tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&self.model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %self.model_path.display(), "ONNX text model loaded");

        let mut tokenizer = Tokenizer::from_file(&self.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: self.spec.input_size,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        // CLIP's text tower was exported with a fixed sequence length.
        let strategy = match self.spec.kind {
            ModelKind::TextPooled => tokenizers::PaddingStrategy::Fixed(self.spec.input_size),
            _ => tokenizers::PaddingStrategy::BatchLongest,
        };
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy,
            ..Default::default()
        }));

        Ok(Loaded { session, tokenizer })
    }

    fn run(&self, loaded: &mut Loaded, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let inputs: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let encodings = loaded
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask_flat.clone().into_boxed_slice()))?;

        let dim = self.spec.dimensions;
        match self.spec.kind {
            ModelKind::TextPooled => {
                let outputs = loaded.session.run(ort::inputs! {
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_mask_tensor,
                })?;
                let value = outputs
                    .get("text_embeds")
                    .or_else(|| outputs.get("pooler_output"))
                    .unwrap_or_else(|| &outputs[0]);
                let (shape, data) = value
                    .try_extract_tensor::<f32>()
                    .context("failed to extract text_embeds tensor")?;
                let dims: &[i64] = &shape;
                anyhow::ensure!(
                    dims.len() == 2 && dims[1] == dim as i64,
                    "unexpected text_embeds shape: {dims:?}, expected [batch, {dim}]"
                );
                Ok(data.chunks(dim).map(l2_normalize).collect())
            }
            _ => {
                // token_type_ids: all zeros (single sentence, no segment B)
                let token_type_ids = vec![0i64; batch_size * seq_len];
                let token_type_ids_tensor =
                    Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

                let outputs = loaded.session.run(ort::inputs! {
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_mask_tensor,
                    "token_type_ids" => token_type_ids_tensor,
                })?;

                // The output name varies by ONNX export. Try common names, fall back to index 0.
                let token_emb_value = outputs
                    .get("token_embeddings")
                    .or_else(|| outputs.get("last_hidden_state"))
                    .unwrap_or_else(|| &outputs[0]);

                let (shape, data) = token_emb_value
                    .try_extract_tensor::<f32>()
                    .context("failed to extract token_embeddings tensor")?;

                let dims: &[i64] = &shape;
                anyhow::ensure!(
                    dims.len() == 3 && dims[2] == dim as i64,
                    "unexpected token_embeddings shape: {dims:?}, expected [batch, seq, {dim}]"
                );
                let actual_seq_len = dims[1] as usize;

                Ok((0..batch_size)
                    .map(|b| {
                        mean_pool(
                            &data[b * actual_seq_len * dim..(b + 1) * actual_seq_len * dim],
                            &attention_mask_flat[b * seq_len..(b + 1) * seq_len],
                            dim,
                        )
                    })
                    .collect())
            }
        }
    }
}

/// Attention-masked mean over one sequence's token embeddings, then L2 normalized.
fn mean_pool(tokens: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (s, token) in tokens.chunks(dim).enumerate() {
        let weight = mask.get(s).copied().unwrap_or(0) as f32;
        if weight > 0.0 {
            for (acc, value) in sum.iter_mut().zip(token) {
                *acc += value * weight;
            }
            count += weight;
        }
    }
    if count > 0.0 {
        sum.iter_mut().for_each(|v| *v /= count);
    }
    l2_normalize(&sum)
}

impl EmbeddingProvider<str> for OnnxTextEmbedder {
    fn init(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::ModelLoad(format!("session lock poisoned: {e}")))?;
        if state.is_none() {
            let loaded = self.load().map_err(|e| Error::ModelLoad(format!("{e:#}")))?;
            *state = Some(loaded);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }

    fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::Inference(format!("session lock poisoned: {e}")))?;
        let loaded = state
            .as_mut()
            .ok_or_else(|| Error::ModelNotLoaded(self.spec.name.to_string()))?;
        self.run(loaded, texts)
            .map_err(|e| Error::Inference(format!("{e:#}")))
    }
}
