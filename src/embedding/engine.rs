//! Embedding providers.
//!
//! [`EmbeddingProvider`] is the seam between the index and whatever turns
//! text into vectors. [`CandleEngine`] is the production implementation: a
//! BERT-family sentence encoder run locally with Candle, loaded once and
//! shared by reference for the lifetime of the process.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use ring::digest;
use serde::{Deserialize, Serialize};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::embedding::error::{EmbeddingError, Result};
use crate::embedding::models::{ModelType, Pooling};

/// A vector embedding representing text semantics.
///
/// The embedding dimensionality depends on the model used
/// (e.g., 384 for MiniLM, 768 for BGE base).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector.
    pub values: Vec<f32>,
}

impl Embedding {
    /// Creates a new embedding from a vector of values.
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Returns the dimensionality of this embedding.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Computes cosine similarity with another embedding.
    ///
    /// Returns a value between -1.0 and 1.0. Zero-norm vectors and vectors
    /// of different lengths score 0.0.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        crate::embedding::index::cosine_similarity(&self.values, &other.values)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Anything that maps text to dense vectors with a single fixed model.
///
/// Implementations are not required to tolerate concurrent `encode` calls;
/// callers wanting throughput pass more texts per call instead.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the model (and version) producing the vectors.
    fn model_id(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Encodes texts into one vector each, preserving order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Encodes a search query.
    fn encode_query(&self, query: &str) -> Result<Embedding> {
        self.encode(&[query])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Encoding("provider returned no vector".to_string()))
    }

    /// Encodes corpus documents.
    fn encode_documents(&self, documents: &[&str]) -> Result<Vec<Embedding>> {
        self.encode(documents)
    }
}

/// Rejects inputs that are not text.
///
/// `&str` already guarantees UTF-8; NUL bytes are the remaining sign of
/// binary content that slipped through a lossy conversion.
pub fn validate_texts(texts: &[&str]) -> Result<()> {
    if let Some(pos) = texts.iter().position(|t| t.contains('\0')) {
        return Err(EmbeddingError::Encoding(format!(
            "input {pos} contains NUL bytes; binary content is not text"
        )));
    }
    Ok(())
}

/// Configuration for the embedding engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model to load.
    pub model: ModelType,
    /// Directory holding `model.safetensors`, `config.json` and
    /// `tokenizer.json`. Downloaded from Hugging Face when unset. Vectors
    /// from a local directory are tagged with a fingerprint of its files
    /// rather than the catalogue id.
    pub model_path: Option<PathBuf>,
    /// Truncation length; the model's own limit when unset.
    pub max_seq_length: Option<usize>,
    /// Whether to use GPU acceleration if available.
    pub use_gpu: bool,
    /// Whether to L2-normalize output vectors.
    pub normalize: bool,
    /// Maximum texts per forward pass.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: ModelType::default(),
            model_path: None,
            max_seq_length: None,
            use_gpu: false,
            normalize: true,
            batch_size: 32,
        }
    }
}

#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

/// Resolved on-disk locations of a model's files.
#[derive(Debug, Clone)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        }
    }

    fn download(model: ModelType) -> Result<Self> {
        let unavailable =
            |e: hf_hub::api::sync::ApiError| EmbeddingError::ModelUnavailable(e.to_string());

        let api = hf_hub::api::sync::Api::new().map_err(unavailable)?;
        let repo = api.model(model.hf_model_id().to_string());

        tracing::info!(model_id = model.hf_model_id(), "fetching model files");

        Ok(Self {
            config: repo.get("config.json").map_err(unavailable)?,
            tokenizer: repo.get("tokenizer.json").map_err(unavailable)?,
            weights: repo.get("model.safetensors").map_err(unavailable)?,
        })
    }

    /// `local/<digest>` over the catalogue entry and the bytes of every file.
    ///
    /// Two directories only share an id when they hold the same files and
    /// are read with the same pooling and prefixes.
    fn fingerprint(&self, model: ModelType) -> Result<String> {
        let mut context = digest::Context::new(&digest::SHA256);
        context.update(model.hf_model_id().as_bytes());

        let mut buf = vec![0u8; 64 * 1024];
        for path in [&self.config, &self.tokenizer, &self.weights] {
            let unreadable = |e: std::io::Error| {
                EmbeddingError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
            };
            let mut file = File::open(path).map_err(unreadable)?;
            loop {
                let n = file.read(&mut buf).map_err(unreadable)?;
                if n == 0 {
                    break;
                }
                context.update(&buf[..n]);
            }
        }

        let hex: String = context.finish().as_ref()[..16]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(format!("local/{hex}"))
    }
}

/// Engine for generating text embeddings using local ML models.
///
/// The engine uses Candle for inference, avoiding external API calls
/// to maintain user privacy. CPU inference is deterministic; GPU kernels
/// may differ from it in the last bits.
pub struct CandleEngine {
    config: EmbeddingConfig,
    model_id: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl CandleEngine {
    /// Loads the configured model, downloading it first if no local path
    /// is set. This is expensive; do it once and share the engine.
    pub fn load(config: EmbeddingConfig) -> Result<Self> {
        let files = match &config.model_path {
            Some(dir) => ModelFiles::in_dir(dir),
            None => ModelFiles::download(config.model)?,
        };
        let device = select_device(config.use_gpu)?;

        tracing::info!(
            model = config.model.hf_model_id(),
            ?device,
            "loading embedding model"
        );

        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!(
                "cannot read {}: {e}",
                files.config.display()
            ))
        })?;
        let bert_config: BertConfig = serde_json::from_str(&raw_config).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!(
                "cannot parse {}: {e}",
                files.config.display()
            ))
        })?;
        let HiddenSize { hidden_size: dimension } =
            serde_json::from_str(&raw_config).map_err(|e| {
                EmbeddingError::ModelUnavailable(format!(
                    "cannot parse {}: {e}",
                    files.config.display()
                ))
            })?;

        if !files.weights.exists() {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "missing weights at {}",
                files.weights.display()
            )));
        }
        let model_id = match &config.model_path {
            Some(_) => files.fingerprint(config.model)?,
            None => config.model.hf_model_id().to_string(),
        };
        // SAFETY: the weights file is treated as immutable for the lifetime
        // of the mapping; nothing in this process writes to it.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)? };
        let model = BertModel::load(vb, &bert_config)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!(
                "cannot load tokenizer {}: {e}",
                files.tokenizer.display()
            ))
        })?;
        let max_length = config
            .max_seq_length
            .unwrap_or_else(|| config.model.max_seq_length());
        tokenizer
            .with_padding(Some(PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..Default::default()
            }))
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("tokenizer setup: {e}")))?;

        tracing::info!(%model_id, dimension, max_length, "embedding model ready");

        Ok(Self {
            config,
            model_id,
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    fn encode_prefixed(&self, texts: &[&str], prefix: Option<&str>) -> Result<Vec<Embedding>> {
        match prefix {
            Some(prefix) => {
                let owned: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
                let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
                self.encode(&refs)
            }
            None => self.encode(texts),
        }
    }

    /// Runs one forward pass over a batch and pools it to sentence vectors.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Encoding(format!("tokenization failed: {e}")))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            type_ids.extend_from_slice(encoding.get_type_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let type_ids = Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;
        let mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;

        // (batch, seq_len, hidden)
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        let pooled = match self.config.model.pooling() {
            Pooling::Cls => hidden.i((.., 0))?,
            Pooling::Mean => {
                let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
                let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
                let counts = mask.sum(1)?;
                summed.broadcast_div(&counts)?
            }
        };

        let pooled = if self.config.normalize {
            let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, 1e-12)?;
            pooled.broadcast_div(&norms)?
        } else {
            pooled
        };

        let rows = pooled
            .to_dtype(DType::F32)?
            .to_device(&Device::Cpu)?
            .to_vec2::<f32>()?;
        Ok(rows.into_iter().map(Embedding::new).collect())
    }
}

impl EmbeddingProvider for CandleEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Empty strings are accepted; they encode to the special tokens only,
    /// so their vector is whatever the model makes of `[CLS] [SEP]`.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        validate_texts(texts)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            out.extend(self.encode_batch(chunk)?);
        }

        tracing::debug!(count = out.len(), "encoded texts");
        Ok(out)
    }

    fn encode_query(&self, query: &str) -> Result<Embedding> {
        self.encode_prefixed(&[query], self.config.model.query_prefix())?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Encoding("model returned no vector".to_string()))
    }

    fn encode_documents(&self, documents: &[&str]) -> Result<Vec<Embedding>> {
        self.encode_prefixed(documents, self.config.model.document_prefix())
    }
}

fn select_device(use_gpu: bool) -> Result<Device> {
    if use_gpu {
        if candle_core::utils::cuda_is_available() {
            return Ok(Device::new_cuda(0)?);
        }
        if candle_core::utils::metal_is_available() {
            return Ok(Device::new_metal(0)?);
        }
        tracing::warn!("GPU requested but none available, falling back to CPU");
    }
    Ok(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_dimension() {
        let embedding = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(embedding.dimension(), 3);
    }

    #[test]
    fn cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.cosine_similarity(&b) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn cosine_similarity_mismatched_dims() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn validate_rejects_binary() {
        assert!(validate_texts(&["hello", "world"]).is_ok());
        let err = validate_texts(&["ok", "bin\0ary"]).unwrap_err();
        assert!(matches!(err, EmbeddingError::Encoding(_)));
    }

    #[test]
    fn default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, ModelType::MultilingualE5Small);
        assert!(config.normalize);
        assert!(!config.use_gpu);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn load_from_missing_dir_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = CandleEngine::load(config).err().unwrap();
        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
    }

    fn write_model_dir(weights: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), br#"{"hidden_size": 4}"#).unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("model.safetensors"), weights).unwrap();
        dir
    }

    #[test]
    fn local_fingerprint_follows_file_contents() {
        let a = write_model_dir(b"weights-a");
        let same = write_model_dir(b"weights-a");
        let other = write_model_dir(b"weights-b");
        let model = ModelType::default();

        let id_a = ModelFiles::in_dir(a.path()).fingerprint(model).unwrap();
        let id_same = ModelFiles::in_dir(same.path()).fingerprint(model).unwrap();
        let id_other = ModelFiles::in_dir(other.path()).fingerprint(model).unwrap();

        assert!(id_a.starts_with("local/"));
        assert_ne!(id_a, model.hf_model_id());
        assert_eq!(id_a, id_same);
        assert_ne!(id_a, id_other);
    }

    #[test]
    fn local_fingerprint_includes_catalogue_entry() {
        let dir = write_model_dir(b"weights");
        let files = ModelFiles::in_dir(dir.path());
        assert_ne!(
            files.fingerprint(ModelType::MultilingualE5Small).unwrap(),
            files.fingerprint(ModelType::ParaphraseMultilingualMiniLm).unwrap()
        );
    }

    #[test]
    fn local_fingerprint_needs_every_file() {
        let dir = write_model_dir(b"weights");
        std::fs::remove_file(dir.path().join("tokenizer.json")).unwrap();
        let err = ModelFiles::in_dir(dir.path())
            .fingerprint(ModelType::default())
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
    }

    #[test]
    #[ignore = "downloads model weights from Hugging Face"]
    fn real_model_ranks_related_text_higher() {
        let engine = CandleEngine::load(EmbeddingConfig::default()).unwrap();
        let docs = engine
            .encode_documents(&["I love sunny days", "The stock market crashed today"])
            .unwrap();
        let query = engine.encode_query("sunny weather").unwrap();

        assert_eq!(docs[0].dimension(), engine.dimension());
        assert!(query.cosine_similarity(&docs[0]) > query.cosine_similarity(&docs[1]));
    }
}
