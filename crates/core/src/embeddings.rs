use crate::error::ProviderError;
use crate::traits::EmbeddingClient;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Offline embedder hashing character trigrams into buckets. Deterministic,
/// so it doubles as a provider for local runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingClient for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn max_input_chars(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}

pub(crate) fn ensure_within_limit(
    backend: &str,
    limit: usize,
    text: &str,
) -> Result<(), ProviderError> {
    let actual = text.chars().count();
    if actual > limit {
        return Err(ProviderError::InputTooLarge {
            backend: backend.to_string(),
            limit,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_sync("Hydraulic pressure and flow");
        let second = embedder.embed_sync("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() -> Result<(), ProviderError> {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await?;
        assert_eq!(vector.len(), 32);
        Ok(())
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = CharacterNgramEmbedder::default();
        let question = embedder.embed_sync("What is the capital of France?");
        let relevant = embedder.embed_sync("The capital of France is Paris.");
        let unrelated = embedder.embed_sync("Hydraulic pumps need regular maintenance.");
        assert!(
            cosine_similarity(&question, &relevant) > cosine_similarity(&question, &unrelated)
        );
    }

    #[test]
    fn limit_is_counted_in_chars() {
        assert!(ensure_within_limit("test", 3, "ééé").is_ok());
        assert!(matches!(
            ensure_within_limit("test", 3, "éééé"),
            Err(ProviderError::InputTooLarge { actual: 4, .. })
        ));
    }
}
