//! Cosine-similarity search over an embedding matrix.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::engine::EmbeddingProvider;
use crate::embedding::error::{EmbeddingError, Result};
use crate::embedding::matrix::EmbeddingMatrix;

/// One ranked corpus row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Row of the document in corpus order.
    pub index: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Cosine of the angle between `a` and `b`.
///
/// Zero when either vector has zero norm or the result is not finite.
/// Rounding is clamped so the value never leaves `[-1, 1]`. The shorter
/// length wins if the slices differ; callers check dimensions first.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Scores every row of `matrix` against `query` and sorts them.
///
/// Rows come back by descending score; equal scores keep ascending row
/// order. Nothing is dropped, so the result has exactly `matrix.len()`
/// entries.
pub fn rank(query: &[f32], matrix: &EmbeddingMatrix) -> Result<Vec<SearchResult>> {
    if matrix.is_empty() {
        return Ok(Vec::new());
    }
    if query.len() != matrix.dim() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: matrix.dim(),
            actual: query.len(),
        });
    }

    let mut results: Vec<SearchResult> = matrix
        .rows()
        .enumerate()
        .map(|(index, row)| SearchResult {
            index,
            score: cosine_similarity(query, row),
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    Ok(results)
}

/// Encodes `documents` in order into a matrix.
pub fn build(provider: &dyn EmbeddingProvider, documents: &[&str]) -> Result<EmbeddingMatrix> {
    let rows = provider.encode_documents(documents)?;
    if rows.len() != documents.len() {
        return Err(EmbeddingError::Encoding(format!(
            "provider returned {} vectors for {} documents",
            rows.len(),
            documents.len()
        )));
    }
    EmbeddingMatrix::from_rows(provider.model_id(), provider.dimension(), rows)
}

/// Embeds `query` and ranks every row of `matrix` against it.
///
/// The matrix must come from the same model as `provider`.
pub fn search(
    provider: &dyn EmbeddingProvider,
    query: &str,
    matrix: &EmbeddingMatrix,
) -> Result<Vec<SearchResult>> {
    if matrix.model_id() != provider.model_id() {
        return Err(EmbeddingError::ModelMismatch {
            expected: provider.model_id().to_string(),
            found: matrix.model_id().to_string(),
        });
    }
    if matrix.is_empty() {
        return Ok(Vec::new());
    }

    let query = provider.encode_query(query)?;
    rank(&query.values, matrix)
}

/// A provider paired with the matrix it searches.
///
/// The index owns its matrix for as long as it lives; the artifact on disk
/// is the copy that survives restarts. The provider is shared.
pub struct SimilarityIndex {
    provider: Arc<dyn EmbeddingProvider>,
    matrix: EmbeddingMatrix,
}

impl SimilarityIndex {
    /// Encodes the corpus into a fresh index.
    pub fn build(provider: Arc<dyn EmbeddingProvider>, documents: &[&str]) -> Result<Self> {
        let started = std::time::Instant::now();
        let matrix = build(provider.as_ref(), documents)?;

        tracing::info!(
            documents = documents.len(),
            model_id = provider.model_id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built similarity index"
        );
        Ok(Self { provider, matrix })
    }

    /// Loads a persisted matrix, checking it was built with `provider`'s model.
    pub fn open(provider: Arc<dyn EmbeddingProvider>, path: impl AsRef<Path>) -> Result<Self> {
        let matrix = EmbeddingMatrix::load(path)?;
        Self::from_matrix(provider, matrix)
    }

    /// Wraps an existing matrix.
    pub fn from_matrix(provider: Arc<dyn EmbeddingProvider>, matrix: EmbeddingMatrix) -> Result<Self> {
        if matrix.model_id() != provider.model_id() {
            return Err(EmbeddingError::ModelMismatch {
                expected: provider.model_id().to_string(),
                found: matrix.model_id().to_string(),
            });
        }
        if !matrix.is_empty() && matrix.dim() != provider.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: provider.dimension(),
                actual: matrix.dim(),
            });
        }
        Ok(Self { provider, matrix })
    }

    /// Writes the matrix to disk.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        self.matrix.persist(path)
    }

    /// Ranks every document against `query`.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let results = search(self.provider.as_ref(), query, &self.matrix)?;
        tracing::debug!(query, results = results.len(), "searched index");
        Ok(results)
    }

    /// The `k` best matches for `query`.
    pub fn top_k(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let mut results = self.search(query)?;
        results.truncate(k);
        Ok(results)
    }

    /// The indexed matrix.
    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}
