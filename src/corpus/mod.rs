//! The email corpus on disk.
//!
//! A corpus is a directory of `*.json` files, one [`EmailRecord`] each.
//! Files are read in byte order of their names, and that order assigns
//! each email its row in the embedding matrix. Row index is the only link
//! between a document and its vector, so the order must never change
//! between building an index and searching it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::EmailRecord;

/// Errors that can occur while reading or writing the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid email record {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Email record {} is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
}

/// Result type for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// A corpus email together with the file it came from.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    /// Source file.
    pub path: PathBuf,
    /// Parsed record.
    pub email: EmailRecord,
}

/// An ordered, read-only collection of emails.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<CorpusDocument>,
}

impl Corpus {
    /// Reads every `*.json` record in `dir`, sorted by file name.
    ///
    /// Other files are ignored. Any unreadable or malformed record fails
    /// the whole load, naming the file.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let io_err = |path: &Path, source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            if is_json && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            let text = String::from_utf8(bytes).map_err(|_| CorpusError::Encoding {
                path: path.clone(),
            })?;
            let email: EmailRecord =
                serde_json::from_str(&text).map_err(|source| CorpusError::Parse {
                    path: path.clone(),
                    source,
                })?;
            documents.push(CorpusDocument { path, email });
        }

        tracing::info!(dir = %dir.display(), documents = documents.len(), "loaded corpus");
        Ok(Self { documents })
    }

    /// Creates a corpus from in-memory records, keeping their order.
    pub fn from_records(records: impl IntoIterator<Item = EmailRecord>) -> Self {
        let documents = records
            .into_iter()
            .enumerate()
            .map(|(i, email)| CorpusDocument {
                path: PathBuf::from(record_file_name(i)),
                email,
            })
            .collect();
        Self { documents }
    }

    /// Writes `record` as `email_{n}.json` in `dir`, pretty-printed.
    pub fn write_record(dir: impl AsRef<Path>, n: usize, record: &EmailRecord) -> Result<PathBuf> {
        let path = dir.as_ref().join(record_file_name(n));
        let json = serde_json::to_string_pretty(record).map_err(|source| CorpusError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| CorpusError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Email bodies in row order; this is the text that gets embedded.
    pub fn bodies(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.email.body.as_str()).collect()
    }

    /// The document at `row`.
    pub fn get(&self, row: usize) -> Option<&CorpusDocument> {
        self.documents.get(row)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn record_file_name(n: usize) -> String {
    format!("email_{n}.json")
}
