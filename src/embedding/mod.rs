//! Vector embedding and semantic search.
//!
//! This module provides local ML-based text embeddings using Candle
//! and cosine-similarity search over the email corpus.
//!
//! # Architecture
//!
//! - [`EmbeddingProvider`] - Maps text to vectors with one fixed model
//! - [`CandleEngine`] - The Candle-backed provider
//! - [`EmbeddingMatrix`] - One row per document, persisted as safetensors
//! - [`SimilarityIndex`] - Ranks every row against a query
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailsense::embedding::{CandleEngine, EmbeddingConfig, SimilarityIndex};
//!
//! let engine = Arc::new(CandleEngine::load(EmbeddingConfig::default())?);
//!
//! let index = SimilarityIndex::build(engine.clone(), &corpus.bodies())?;
//! index.persist("embeddings.safetensors")?;
//!
//! let index = SimilarityIndex::open(engine, "embeddings.safetensors")?;
//! let results = index.top_k("project deadline", 5)?;
//! ```

mod engine;
mod error;
mod index;
mod matrix;
mod models;

pub use engine::{validate_texts, CandleEngine, Embedding, EmbeddingConfig, EmbeddingProvider};
pub use error::{EmbeddingError, Result};
pub use index::{build, cosine_similarity, rank, search, SearchResult, SimilarityIndex};
pub use matrix::{EmbeddingMatrix, FORMAT_VERSION, TENSOR_NAME};
pub use models::{ModelType, Pooling};
