//! The embedding matrix and its on-disk artifact.
//!
//! A matrix is one row per corpus document, in corpus order, all rows the
//! same length and produced by the same model. It is persisted as a single
//! safetensors file holding one `embeddings` tensor of shape
//! `[rows, dim]` plus `model_id` / `format_version` header metadata.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::embedding::engine::Embedding;
use crate::embedding::error::{EmbeddingError, Result};

/// Name of the tensor holding the matrix inside the artifact.
pub const TENSOR_NAME: &str = "embeddings";

/// Artifact layout version written into the header.
pub const FORMAT_VERSION: &str = "1";

const META_MODEL_ID: &str = "model_id";
const META_FORMAT_VERSION: &str = "format_version";

/// Dense row-major matrix of embedding vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    model_id: String,
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Creates an empty matrix for a model with the given dimensionality.
    pub fn empty(model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dim,
            data: Vec::new(),
        }
    }

    /// Builds a matrix from rows, rejecting ragged input.
    pub fn from_rows(
        model_id: impl Into<String>,
        dim: usize,
        rows: impl IntoIterator<Item = Embedding>,
    ) -> Result<Self> {
        let mut matrix = Self::empty(model_id, dim);
        for row in rows {
            if dim == 0 {
                return Err(EmbeddingError::ZeroDimension);
            }
            if row.dimension() != dim {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dim,
                    actual: row.dimension(),
                });
            }
            matrix.data.extend_from_slice(&row.values);
        }
        Ok(matrix)
    }

    /// Model that produced every row.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Length of every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `index`, if it exists.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Iterates rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on zero; an empty slice iterates nothing.
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Writes the matrix to `path`, replacing any existing artifact.
    ///
    /// Bytes go to a temporary file in the same directory which is synced
    /// and renamed over `path`, so readers never observe a partial
    /// artifact. The temporary file is removed on every failure path.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(path)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| EmbeddingError::io(path, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| EmbeddingError::io(path, e))?;
        tmp.persist(path)
            .map_err(|e| EmbeddingError::io(path, e.error))?;

        tracing::info!(
            path = %path.display(),
            rows = self.len(),
            dim = self.dim,
            bytes = bytes.len(),
            "persisted embedding matrix"
        );
        Ok(())
    }

    /// Reads an artifact written by [`EmbeddingMatrix::persist`].
    ///
    /// Missing or unreadable files are [`EmbeddingError::Io`]; anything that
    /// is not exactly one rank-2 float tensor is [`EmbeddingError::Format`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| EmbeddingError::io(path, e))?;
        let matrix = Self::from_bytes(path, &bytes)?;

        tracing::info!(
            path = %path.display(),
            rows = matrix.len(),
            dim = matrix.dim,
            model_id = %matrix.model_id,
            "loaded embedding matrix"
        );
        Ok(matrix)
    }

    fn to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let raw: Vec<u8> = self.data.iter().flat_map(|f| f.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![self.len(), self.dim], &raw)
            .map_err(|e| EmbeddingError::format(path, e.to_string()))?;

        let metadata = HashMap::from([
            (META_MODEL_ID.to_string(), self.model_id.clone()),
            (META_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string()),
        ]);

        safetensors::serialize([(TENSOR_NAME, view)], &Some(metadata))
            .map_err(|e| EmbeddingError::format(path, e.to_string()))
    }

    fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let invalid = |reason: String| EmbeddingError::format(path, reason);

        let (_, header) = SafeTensors::read_metadata(bytes).map_err(|e| invalid(e.to_string()))?;
        let metadata = header.metadata().clone().unwrap_or_default();

        if let Some(version) = metadata.get(META_FORMAT_VERSION) {
            if version != FORMAT_VERSION {
                return Err(invalid(format!("unsupported format version {version}")));
            }
        }
        let model_id = metadata
            .get(META_MODEL_ID)
            .cloned()
            .ok_or_else(|| invalid("missing model_id metadata".to_string()))?;

        let tensors = SafeTensors::deserialize(bytes).map_err(|e| invalid(e.to_string()))?;
        if tensors.len() != 1 {
            return Err(invalid(format!("expected 1 tensor, found {}", tensors.len())));
        }
        let view = tensors
            .tensor(TENSOR_NAME)
            .map_err(|e| invalid(e.to_string()))?;

        let (rows, dim) = match view.shape() {
            [rows, dim] => (*rows, *dim),
            shape => return Err(invalid(format!("expected rank-2 tensor, got shape {shape:?}"))),
        };

        let data: Vec<f32> = match view.dtype() {
            Dtype::F32 => view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            // Wider artifacts from other tools are narrowed to the in-memory precision.
            Dtype::F64 => view
                .data()
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
                .collect(),
            other => return Err(invalid(format!("unsupported dtype {other:?}"))),
        };

        if dim == 0 && rows > 0 {
            return Err(invalid(format!("{rows} rows of zero-length vectors")));
        }
        if data.len() != rows * dim {
            return Err(invalid(format!(
                "shape [{rows}, {dim}] does not match {} values",
                data.len()
            )));
        }

        Ok(Self {
            model_id,
            dim,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(
            "test-model",
            3,
            vec![
                Embedding::new(vec![1.0, 0.0, -0.5]),
                Embedding::new(vec![0.25, f32::MIN_POSITIVE, 3.5e-8]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rows_and_len() {
        let matrix = sample();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.row(1), Some(&[0.25, f32::MIN_POSITIVE, 3.5e-8][..]));
        assert_eq!(matrix.row(2), None);
        assert_eq!(matrix.rows().count(), 2);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = EmbeddingMatrix::from_rows(
            "m",
            2,
            vec![Embedding::new(vec![1.0, 2.0]), Embedding::new(vec![1.0])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn zero_width_rows_rejected() {
        let err = EmbeddingMatrix::from_rows("m", 0, vec![Embedding::new(Vec::new())]).unwrap_err();
        assert!(matches!(err, EmbeddingError::ZeroDimension));

        let empty = EmbeddingMatrix::from_rows("m", 0, Vec::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn persist_then_load_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.safetensors");
        let matrix = sample();

        matrix.persist(&path).unwrap();
        let loaded = EmbeddingMatrix::load(&path).unwrap();

        assert_eq!(loaded, matrix);
        assert_eq!(loaded.model_id(), "test-model");
    }

    #[test]
    fn empty_matrix_survives_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.safetensors");
        let matrix = EmbeddingMatrix::empty("test-model", 4);

        matrix.persist(&path).unwrap();
        let loaded = EmbeddingMatrix::load(&path).unwrap();

        assert!(loaded.is_empty());
        assert_eq!(loaded.dim(), 4);
    }

    #[test]
    fn persist_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.safetensors");

        sample().persist(&path).unwrap();
        let smaller =
            EmbeddingMatrix::from_rows("other", 1, vec![Embedding::new(vec![7.0])]).unwrap();
        smaller.persist(&path).unwrap();

        assert_eq!(EmbeddingMatrix::load(&path).unwrap(), smaller);
        // Only the artifact remains; no temporary files leak.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EmbeddingMatrix::load(dir.path().join("nope.safetensors")).unwrap_err();
        assert!(matches!(err, EmbeddingError::Io { .. }));
    }

    #[test]
    fn persist_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = sample()
            .persist(dir.path().join("missing").join("m.safetensors"))
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Io { .. }));
    }

    #[test]
    fn garbage_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.safetensors");
        std::fs::write(&path, b"definitely not a tensor file").unwrap();

        let err = EmbeddingMatrix::load(&path).unwrap_err();
        assert!(matches!(err, EmbeddingError::Format { .. }));
    }

    #[test]
    fn truncated_artifact_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.safetensors");
        sample().persist(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = EmbeddingMatrix::load(&path).unwrap_err();
        assert!(matches!(err, EmbeddingError::Format { .. }));
    }

    #[test]
    fn rank_one_tensor_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.safetensors");

        let raw: Vec<u8> = [1.0f32, 2.0, 3.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![3], &raw).unwrap();
        let metadata = HashMap::from([(META_MODEL_ID.to_string(), "m".to_string())]);
        let bytes = safetensors::serialize([(TENSOR_NAME, view)], &Some(metadata)).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let err = EmbeddingMatrix::load(&path).unwrap_err();
        assert!(matches!(err, EmbeddingError::Format { .. }));
    }

    #[test]
    fn f64_artifact_is_narrowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.safetensors");

        let raw: Vec<u8> = [0.5f64, -1.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F64, vec![1, 2], &raw).unwrap();
        let metadata = HashMap::from([(META_MODEL_ID.to_string(), "m".to_string())]);
        let bytes = safetensors::serialize([(TENSOR_NAME, view)], &Some(metadata)).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let matrix = EmbeddingMatrix::load(&path).unwrap();
        assert_eq!(matrix.row(0), Some(&[0.5f32, -1.0][..]));
    }
}
