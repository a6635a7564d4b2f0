//! Shared helpers for integration tests.

use mailsense::embedding::{validate_texts, Embedding, EmbeddingProvider, Result};

/// Hashes lowercase word tokens into a fixed number of buckets.
///
/// Deterministic and model-free: texts sharing words point the same way,
/// texts sharing none are orthogonal (barring bucket collisions).
pub struct BagOfWords {
    dim: usize,
}

impl BagOfWords {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dim as u64) as usize
    }
}

impl EmbeddingProvider for BagOfWords {
    fn model_id(&self) -> &str {
        "test/bag-of-words"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        validate_texts(texts)?;
        Ok(texts
            .iter()
            .map(|text| {
                let mut values = vec![0.0f32; self.dim];
                for token in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    values[self.bucket(&token.to_lowercase())] += 1.0;
                }
                Embedding::new(values)
            })
            .collect())
    }
}
