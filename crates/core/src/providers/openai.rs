use crate::embeddings::ensure_within_limit;
use crate::error::ProviderError;
use crate::traits::{EmbeddingClient, GenerationClient};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const BACKEND: &str = "openai";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// `text-embedding-3-small` output size.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1_536;
/// Roughly 8k tokens at ~3 chars per token, with headroom.
const DEFAULT_EMBEDDING_INPUT_CHARS: usize = 24_000;
const DEFAULT_PROMPT_CHARS: usize = 48_000;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    pub max_prompt_chars: usize,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            max_prompt_chars: DEFAULT_PROMPT_CHARS,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config("api key must not be empty".to_string()));
        }
        let mut base = Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(path)?)
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    Err(ProviderError::Status {
        backend: BACKEND.to_string(),
        status: status.as_u16(),
        details,
    })
}

pub struct OpenAiEmbeddings {
    config: OpenAiConfig,
    endpoint: Url,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let endpoint = config.endpoint("embeddings")?;
        Ok(Self {
            config,
            endpoint,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.config.embedding_model
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    fn max_input_chars(&self) -> usize {
        DEFAULT_EMBEDDING_INPUT_CHARS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "embedding response was empty".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_within_limit(BACKEND, self.max_input_chars(), text)?;
        }

        debug!(model = %self.config.embedding_model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.embedding_model,
                "input": texts,
            }))
            .send()
            .await?;
        let parsed: Value = check_status(response).await?.json().await?;

        parse_embeddings(&parsed, texts.len(), self.config.embedding_dimensions)
    }
}

fn parse_embeddings(
    parsed: &Value,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = parsed
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "missing data array".to_string(),
        })?;

    let mut rows = data
        .iter()
        .enumerate()
        .map(|(position, row)| {
            let index = row
                .pointer("/index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let vector = row
                .pointer("/embedding")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (index, vector)
        })
        .collect::<Vec<_>>();
    rows.sort_by_key(|(index, _)| *index);

    if rows.len() != expected {
        return Err(ProviderError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("expected {expected} embeddings, got {}", rows.len()),
        });
    }
    if let Some((index, vector)) = rows.iter().find(|(_, vector)| vector.len() != dimensions) {
        return Err(ProviderError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!(
                "embedding {index} has dimension {} != {dimensions}",
                vector.len()
            ),
        });
    }

    Ok(rows.into_iter().map(|(_, vector)| vector).collect())
}

pub struct OpenAiChat {
    config: OpenAiConfig,
    endpoint: Url,
    client: Client,
}

impl OpenAiChat {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let endpoint = config.endpoint("chat/completions")?;
        Ok(Self {
            config,
            endpoint,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiChat {
    fn model(&self) -> &str {
        &self.config.chat_model
    }

    fn max_prompt_chars(&self) -> usize {
        self.config.max_prompt_chars
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        ensure_within_limit(BACKEND, self.max_prompt_chars(), prompt)?;
        debug!(model = %self.config.chat_model, prompt_chars = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.chat_model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0.1,
            }))
            .send()
            .await?;
        let parsed: Value = check_status(response).await?.json().await?;

        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "completion had no message content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_against_base_path() -> Result<(), ProviderError> {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = "http://localhost:8080/v1".to_string();

        assert_eq!(
            config.endpoint("embeddings")?.as_str(),
            "http://localhost:8080/v1/embeddings"
        );
        assert_eq!(
            OpenAiConfig::new("sk-test").endpoint("chat/completions")?.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        Ok(())
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = OpenAiEmbeddings::new(OpenAiConfig::new("  "));
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn embeddings_are_reordered_by_index() -> Result<(), ProviderError> {
        let parsed = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });

        let vectors = parse_embeddings(&parsed, 2, 2)?;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn wrong_dimension_is_a_backend_error() {
        let parsed = json!({ "data": [{ "index": 0, "embedding": [1.0] }] });
        let result = parse_embeddings(&parsed, 1, 2);
        assert!(matches!(result, Err(ProviderError::BackendResponse { .. })));
    }

    #[test]
    fn server_errors_are_transient() {
        let overloaded = ProviderError::Status {
            backend: BACKEND.to_string(),
            status: 503,
            details: "overloaded".to_string(),
        };
        let unauthorized = ProviderError::Status {
            backend: BACKEND.to_string(),
            status: 401,
            details: "bad key".to_string(),
        };
        assert!(overloaded.is_transient());
        assert!(!unauthorized.is_transient());
    }
}
