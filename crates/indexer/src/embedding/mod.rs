// Embedding service client abstraction.
//
// The orchestrator only talks to `EmbeddingClient`; production uses the
// OpenAI-compatible HTTP client, tests inject mocks.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub use self::http::HttpEmbeddingClient;

pub type Embedding = Vec<f32>;

pub type EmbeddingFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EmbeddingError>> + Send + 'a>>;

/// Batch embedding service.
pub trait EmbeddingClient: Send + Sync {
    /// Embed `texts`; the result must hold one vector per input, in order.
    fn embed(&self, texts: Vec<String>) -> EmbeddingFuture<'_, Vec<Embedding>>;

    fn embed_title(&self, title: String) -> EmbeddingFuture<'_, Embedding> {
        Box::pin(async move {
            let mut vectors = self.embed(vec![title]).await?;
            match (vectors.pop(), vectors.len()) {
                (Some(vector), 0) => Ok(vector),
                (popped, rest) => Err(EmbeddingError::Misaligned {
                    expected: 1,
                    actual: rest + usize::from(popped.is_some()),
                }),
            }
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    Misaligned { expected: usize, actual: usize },
    #[error("embedding {index} is unusable: {reason}")]
    InvalidVector { index: usize, reason: String },
    #[error("environment variable `{0}` holding the embedding API key is not set")]
    MissingApiKey(String),
}

/// Check a vector against the dimension seen so far.
pub fn check_vector(index: usize, vector: &[f32], dimension: Option<usize>) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidVector { index, reason: "empty vector".into() });
    }
    if let Some(expected) = dimension {
        if vector.len() != expected {
            return Err(EmbeddingError::InvalidVector {
                index,
                reason: format!("dimension {} differs from {expected}", vector.len()),
            });
        }
    }
    if vector.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingError::InvalidVector { index, reason: "non-finite component".into() });
    }
    Ok(())
}
