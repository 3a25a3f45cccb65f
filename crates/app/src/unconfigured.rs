use async_trait::async_trait;
use pdf_qa_core::{EmbeddingClient, GenerationClient, ProviderError};

/// Stand-in for a hosted model when no API key was given. Commands that
/// never call a provider still work; the rest fail with a config error.
pub struct Unconfigured {
    model: String,
}

impl Unconfigured {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    fn missing_key() -> ProviderError {
        ProviderError::Config(
            "OPENAI_API_KEY is not set; pass --openai-api-key or use --embedder ngram".to_string(),
        )
    }
}

#[async_trait]
impl EmbeddingClient for Unconfigured {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        1
    }

    fn max_input_chars(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(Self::missing_key())
    }
}

#[async_trait]
impl GenerationClient for Unconfigured {
    fn model(&self) -> &str {
        &self.model
    }

    fn max_prompt_chars(&self) -> usize {
        usize::MAX
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(Self::missing_key())
    }
}
