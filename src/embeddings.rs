//! Local embedding inference: a codebert-style ONNX model, mean-pooled
//! and L2-normalized, run entirely on-device so indexing never leaves a
//! network trace of the schema being indexed.

use crate::contracts::Embedder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const EMBEDDING_DIMENSIONS: usize = 768;
pub const MODEL_FILENAME: &str = "codebert-base-v1.onnx";
pub const TOKENIZER_FILENAME: &str = "codebert-base-v1.tokenizer.json";

#[cfg(feature = "embeddings-onnx")]
mod onnx_backend {
    use super::*;
    use ndarray::{Array2, Axis};
    use ort::session::Session;
    use tokenizers::Tokenizer;

    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(models_dir: &Path) -> Result<Self> {
            let model_path = models_dir.join(MODEL_FILENAME);
            let tokenizer_path = models_dir.join(TOKENIZER_FILENAME);

            let session = Session::builder()?.commit_from_file(&model_path).with_context(|| format!("loading {}", model_path.display()))?;
            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| anyhow::anyhow!("loading tokenizer {}: {e}", tokenizer_path.display()))?;

            Ok(Self { session: Mutex::new(session), tokenizer })
        }

        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            let encoding = self.tokenizer.encode(text, true).map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
            let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();

            let seq_len = ids.len();
            let input_ids = Array2::from_shape_vec((1, seq_len), ids)?;
            let attention_mask = Array2::from_shape_vec((1, seq_len), mask.clone())?;

            let mut session = self.session.lock().expect("onnx session mutex poisoned");
            let outputs = session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ]?)?;

            let hidden = outputs[0].try_extract_tensor::<f32>()?;
            let hidden = hidden.view();

            let mut pooled = vec![0f32; EMBEDDING_DIMENSIONS];
            let mut token_count = 0f32;
            for (token_idx, &keep) in mask.iter().enumerate() {
                if keep == 0 {
                    continue;
                }
                token_count += 1.0;
                let row = hidden.index_axis(Axis(1), token_idx);
                let row = row.index_axis(Axis(0), 0);
                for (d, value) in row.iter().enumerate().take(EMBEDDING_DIMENSIONS) {
                    pooled[d] += value;
                }
            }
            if token_count > 0.0 {
                for v in &mut pooled {
                    *v /= token_count;
                }
            }

            let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut pooled {
                    *v /= norm;
                }
            }

            Ok(pooled)
        }
    }

    #[async_trait::async_trait]
    impl Embedder for OnnxEmbedder {
        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSIONS
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // ONNX inference is CPU-bound and short; run it inline rather
            // than hopping to a blocking-pool thread for a few milliseconds
            // of work.
            self.encode(text)
        }
    }
}

#[cfg(feature = "embeddings-onnx")]
pub use onnx_backend::OnnxEmbedder;

static MODEL_PRESENCE_WARNED: OnceCell<()> = OnceCell::new();

/// Builds the configured embedder, or `None` if the model files aren't
/// present on disk yet (e.g. before `qpg init` has fetched them) — ingest
/// then runs in lexical-only mode rather than failing outright.
#[cfg(feature = "embeddings-onnx")]
pub fn load_embedder(models_dir: &Path) -> Option<Box<dyn Embedder>> {
    let model_path = models_dir.join(MODEL_FILENAME);
    let tokenizer_path = models_dir.join(TOKENIZER_FILENAME);
    if !model_path.exists() || !tokenizer_path.exists() {
        MODEL_PRESENCE_WARNED.get_or_init(|| {
            tracing::warn!(dir = %models_dir.display(), "embedding model files not found, falling back to lexical-only search");
        });
        return None;
    }

    match onnx_backend::OnnxEmbedder::load(models_dir) {
        Ok(embedder) => Some(Box::new(embedder)),
        Err(err) => {
            tracing::warn!(%err, "failed to load local embedding model, falling back to lexical-only search");
            None
        }
    }
}

#[cfg(not(feature = "embeddings-onnx"))]
pub fn load_embedder(_models_dir: &Path) -> Option<Box<dyn Embedder>> {
    None
}

pub fn default_model_path(models_dir: &Path) -> PathBuf {
    models_dir.join(MODEL_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_path_joins_models_dir() {
        let path = default_model_path(Path::new("/tmp/models"));
        assert_eq!(path, Path::new("/tmp/models").join(MODEL_FILENAME));
    }
}
