//! Synthetic corpus generation.
//!
//! Asks a chat model for realistic Italian business emails, one completion
//! per email, constrained to the [`EmailRecord`] shape by a strict JSON
//! schema. Each email is written to `email_{i}.json` in the output
//! directory, ready for [`Corpus::load`](crate::corpus::Corpus::load).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::{Corpus, CorpusError};
use crate::domain::EmailRecord;
use crate::providers::ai::{
    CompletionRequest, LlmError, LlmProvider, Message, ResponseFormat,
};

const SYSTEM_PROMPT: &str = "Generi email realistiche di contatto, di preventivi, di informazioni, \
di collaborazioni, di acquisto prodotti e tante altre, ricche di dettagli. \
Inventati il cliente, il settore, il progetto che vogliono fare tutto rendendo \
l'idea che sono email realistiche, metti anche cifre di preventivi e contratti \
da firmare/firmati. Io mi chiamo Simone Rizzo e sono il CEO di Inferentia e \
sviluppiamo soluzioni AI custom per i clienti su qualsiasi settore. Devi formattare \
la mail in JSON.";

const USER_PROMPT: &str = "genera una mail";

const EXAMPLE_REPLY: &str = "{\"date\":\"25 ottobre 2023, 14:37 CET\",\
\"subject\":\"Richiesta di Preventivo per Servizi di Marketing Digitale\",\
\"from\":\"m.rossi@azienda.it\",\
\"body\":\"Gentile Sig.ra Bianchi,\\n\\nSpero che questa e-mail vi trovi bene. \
Mi chiamo Marco Rossi e sono il direttore marketing di Azienda S.R.L. ...\"}";

/// Errors that can occur while generating emails.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Completion failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Email {index} is not a valid record: {source}")]
    InvalidEmail {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// Result type for generation.
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Sampling settings for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
            max_tokens: 2048,
        }
    }
}

/// The strict schema every generated email must satisfy.
pub fn email_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "date": {
                "type": "string",
                "description": "La data e l'ora in cui l'email è stata inviata."
            },
            "subject": {
                "type": "string",
                "description": "L'oggetto dell'email."
            },
            "from": {
                "type": "string",
                "description": "L'indirizzo email del mittente."
            },
            "body": {
                "type": "string",
                "description": "Il contenuto principale o il corpo dell'email."
            }
        },
        "required": ["date", "subject", "from", "body"],
        "additionalProperties": false
    })
}

/// Produces synthetic emails with a chat model.
pub struct EmailGenerator {
    provider: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl EmailGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { provider, config }
    }

    fn request(&self) -> CompletionRequest {
        CompletionRequest::new(vec![
            Message::user(USER_PROMPT),
            Message::assistant(EXAMPLE_REPLY),
            Message::user(USER_PROMPT),
        ])
        .with_system_prompt(SYSTEM_PROMPT)
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
        .with_response_format(ResponseFormat::json_schema("email_schema", email_schema()))
    }

    /// Asks for one email.
    pub async fn generate_one(&self, index: usize) -> Result<EmailRecord> {
        let response = self.provider.complete(&self.request()).await?;
        serde_json::from_str(&response.text)
            .map_err(|source| GeneratorError::InvalidEmail { index, source })
    }

    /// Writes `count` emails into `dir`, creating it if needed.
    ///
    /// Stops at the first failure; files already written stay on disk.
    pub async fn generate(&self, count: usize, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| GeneratorError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::with_capacity(count);
        for i in 0..count {
            let email = self.generate_one(i).await?;
            let path = Corpus::write_record(dir, i, &email)?;
            tracing::info!(index = i, subject = %email.subject, path = %path.display(), "generated email");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ai::{CompletionResponse, FinishReason, LlmResult, TokenUsage};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let text = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::InvalidResponse("no more replies".to_string()))?;
            Ok(CompletionResponse {
                text,
                tokens_used: TokenUsage::default(),
                finish_reason: FinishReason::Stop,
            })
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    const EMAIL: &str = r#"{"date": "3 aprile 2024", "subject": "Contratto firmato", "from": "l.verdi@logistica.it", "body": "In allegato il contratto da 48.000 €."}"#;

    #[tokio::test]
    async fn writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(&[EMAIL, EMAIL]));
        let generator = EmailGenerator::new(provider, GeneratorConfig::default());

        let paths = generator.generate(2, dir.path()).await.unwrap();
        assert!(paths[0].ends_with("email_0.json"));
        assert!(paths[1].ends_with("email_1.json"));

        let corpus = Corpus::load(dir.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get(0).unwrap().email.subject, "Contratto firmato");
    }

    #[tokio::test]
    async fn request_uses_schema_and_sampling_settings() {
        let provider = Arc::new(ScriptedProvider::new(&[EMAIL]));
        let generator = EmailGenerator::new(provider.clone(), GeneratorConfig::default());
        generator.generate_one(0).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.temperature, 1.0);
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.messages.len(), 3);
        assert!(request.system_prompt.as_deref().unwrap().contains("Inferentia"));
        assert_eq!(
            request.response_format,
            Some(ResponseFormat::json_schema("email_schema", email_schema()))
        );
    }

    #[tokio::test]
    async fn invalid_json_names_index() {
        let provider = Arc::new(ScriptedProvider::new(&[EMAIL, "not json"]));
        let generator = EmailGenerator::new(provider, GeneratorConfig::default());
        let dir = tempfile::tempdir().unwrap();

        let err = generator.generate(2, dir.path()).await.unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidEmail { index: 1, .. }));
        assert!(dir.path().join("email_0.json").exists());
    }

    #[test]
    fn few_shot_example_is_a_valid_record() {
        let record: EmailRecord = serde_json::from_str(EXAMPLE_REPLY).unwrap();
        assert_eq!(record.from, "m.rossi@azienda.it");
    }
}
