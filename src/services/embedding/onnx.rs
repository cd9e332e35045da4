//! Local sentence-transformer inference through ONNX Runtime.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::{Embedder, HfTokenizer, run_blocking};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::services::chunker::TokenCounter;

/// Mean-pooled, L2-normalized embeddings from an exported transformer.
///
/// Expects `model.onnx` and `tokenizer.json` in the model directory.
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    counter: Arc<HfTokenizer>,
    model_name: String,
    dimension: usize,
    max_input_length: usize,
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_dir();
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = config.tokenizer_file();
        let max_tokens = config.max_input_length as usize;

        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?;

        let counter = Arc::new(HfTokenizer::from_file(&tokenizer_path)?);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        // Chunks already fit; truncation only guards direct callers.
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let model_name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "onnx".to_string());

        info!(model = %model_name, dimension = config.dimension, max_tokens, "loaded ONNX embedding model");

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dimension: config.dimension as usize,
            }),
            counter,
            model_name,
            dimension: config.dimension as usize,
            max_input_length: max_tokens,
        })
    }
}

/// Session and padding tokenizer, shared with blocking inference tasks.
struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxModel {
    fn run(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = i64::from(id);
                attention_mask[i * max_len + j] = i64::from(m);
            }
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let attention_mask_tensor =
            Tensor::from_array(([batch_size, max_len], attention_mask.clone()))
                .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::InferenceError("session lock poisoned".to_string()))?;

        // BERT-style exports take token_type_ids as a third input.
        let wants_token_types = session.inputs.len() > 2;
        let outputs = if wants_token_types {
            session.run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                token_type_ids_tensor
            ])
        } else {
            session.run(ort::inputs![input_ids_tensor, attention_mask_tensor])
        }
        .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let shape = output_array.shape().to_vec();
        let hidden = *shape.last().unwrap_or(&0);
        if hidden != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: hidden,
            });
        }

        let embeddings: Vec<Vec<f32>> = if shape.len() == 3 {
            (0..batch_size)
                .map(|i| {
                    let mut pooled = vec![0f32; hidden];
                    let mut tokens = 0f32;
                    for j in 0..max_len {
                        if attention_mask[i * max_len + j] == 0 {
                            continue;
                        }
                        tokens += 1.0;
                        for (d, value) in pooled.iter_mut().enumerate() {
                            *value += output_array[[i, j, d]];
                        }
                    }
                    if tokens > 0.0 {
                        pooled.iter_mut().for_each(|v| *v /= tokens);
                    }
                    normalize(&pooled)
                })
                .collect()
        } else if shape.len() == 2 {
            (0..batch_size)
                .map(|i| {
                    let embedding: Vec<f32> = (0..hidden).map(|d| output_array[[i, d]]).collect();
                    normalize(&embedding)
                })
                .collect()
        } else {
            return Err(EmbeddingError::InferenceError(format!(
                "unexpected output shape: {:?}",
                shape
            )));
        };

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    fn tokenizer(&self) -> Arc<dyn TokenCounter> {
        self.counter.clone()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        run_blocking(move || model.run(&texts)).await
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = OnnxEmbedder::load(&config);
        assert!(matches!(result, Err(EmbeddingError::ModelNotFound(_))));
    }
}
