use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::{EmbeddingProvider, ensure_non_empty, normalize};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

/// Local sentence-transformer model: mean-pooled, L2-normalized embeddings.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    batch_size: usize,
    token_type_ids: bool,
}

fn model_error(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::ModelError(e.to_string())
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelError(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        info!("Loading embedding model from {}", model_dir.display());
        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .with_intra_threads(num_cpus())
            .map_err(model_error)?
            .commit_from_file(&model_path)
            .map_err(model_error)?;

        let token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_error)?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(model_error)?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!("Embedding model loaded (dim={})", config.dimension);
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
            token_type_ids,
        })
    }

    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(model_error)?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let rows = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids());
            for (j, ((&id, &mask), &type_id)) in rows.enumerate() {
                input_ids[i * seq_len + j] = i64::from(id);
                attention_mask[i * seq_len + j] = i64::from(mask);
                type_ids[i * seq_len + j] = i64::from(type_id);
            }
        }

        let shape = [batch_size, seq_len];
        let ids_tensor = Tensor::from_array((shape, input_ids)).map_err(model_error)?;
        let mask_tensor =
            Tensor::from_array((shape, attention_mask.clone())).map_err(model_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))?;

        let outputs = if self.token_type_ids {
            let type_tensor = Tensor::from_array((shape, type_ids)).map_err(model_error)?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
        }
        .map_err(model_error)?;

        let (output_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(model_error)?;
        let dims: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();

        let embeddings = match dims.as_slice() {
            [b, s, d] if *b == batch_size && *d == self.dimension => (0..batch_size)
                .map(|i| {
                    let mask = &attention_mask[i * seq_len..(i + 1) * seq_len];
                    normalize(&mean_pool(&data[i * s * d..(i + 1) * s * d], mask, *d))
                })
                .collect(),
            [b, d] if *b == batch_size && *d == self.dimension => data
                .chunks(*d)
                .map(normalize)
                .collect(),
            _ => {
                return Err(EmbeddingError::ModelError(format!(
                    "unexpected output shape {:?} for dimension {}",
                    dims, self.dimension
                )));
            }
        };

        Ok(embeddings)
    }
}

/// Average token vectors where the attention mask is set.
fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;

    for (token, &m) in hidden.chunks(dim).zip(mask) {
        if m == 0 {
            continue;
        }
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
        count += 1.0;
    }

    if count > 0.0 {
        pooled.iter_mut().for_each(|v| *v /= count);
    }
    pooled
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        ensure_non_empty(texts)?;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_sync(batch)?);
        }
        Ok(all_embeddings)
    }
}
