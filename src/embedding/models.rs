//! Embedding model catalogue.
//!
//! Every supported model is a BERT-family sentence encoder that candle can
//! load from a `model.safetensors` / `config.json` / `tokenizer.json` triple.
//! The corpus is Italian, so the default is a multilingual model.

use serde::{Deserialize, Serialize};

/// How token states are reduced to a single sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// Average of all unmasked token states.
    Mean,
    /// Hidden state of the leading `[CLS]` token.
    Cls,
}

/// Available embedding model types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Multilingual-E5-Small - asymmetric search across ~100 languages.
    #[default]
    MultilingualE5Small,
    /// Paraphrase-Multilingual-MiniLM-L12-v2 - symmetric multilingual.
    ParaphraseMultilingualMiniLm,
    /// All-MiniLM-L6-v2 - balanced speed and quality, English only.
    AllMiniLmL6V2,
    /// BGE-Small - optimized for retrieval tasks.
    BgeSmall,
    /// BGE-Base - larger retrieval model.
    BgeBase,
    /// E5-Small - good for asymmetric search.
    E5Small,
}

impl ModelType {
    /// Returns the Hugging Face model ID.
    pub fn hf_model_id(&self) -> &'static str {
        match self {
            Self::MultilingualE5Small => "intfloat/multilingual-e5-small",
            Self::ParaphraseMultilingualMiniLm => {
                "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
            }
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BgeSmall => "BAAI/bge-small-en-v1.5",
            Self::BgeBase => "BAAI/bge-base-en-v1.5",
            Self::E5Small => "intfloat/e5-small-v2",
        }
    }

    /// Returns the maximum sequence length.
    pub fn max_seq_length(&self) -> usize {
        match self {
            Self::ParaphraseMultilingualMiniLm => 128,
            Self::AllMiniLmL6V2 => 256,
            Self::MultilingualE5Small | Self::BgeSmall | Self::BgeBase | Self::E5Small => 512,
        }
    }

    /// Returns the pooling strategy the model was trained with.
    pub fn pooling(&self) -> Pooling {
        match self {
            Self::BgeSmall | Self::BgeBase => Pooling::Cls,
            Self::MultilingualE5Small
            | Self::ParaphraseMultilingualMiniLm
            | Self::AllMiniLmL6V2
            | Self::E5Small => Pooling::Mean,
        }
    }

    /// Returns the query prefix if required.
    pub fn query_prefix(&self) -> Option<&'static str> {
        match self {
            Self::MultilingualE5Small | Self::E5Small => Some("query: "),
            _ => None,
        }
    }

    /// Returns the document prefix if required.
    pub fn document_prefix(&self) -> Option<&'static str> {
        match self {
            Self::MultilingualE5Small | Self::E5Small => Some("passage: "),
            _ => None,
        }
    }
}
