// Token accounting for embedding inputs, in the cl100k vocabulary shared by
// the OpenAI embedding models.

use std::sync::OnceLock;

use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load the cl100k vocabulary: {0}")]
pub struct TokenizerError(String);

/// Per-input token limit of the embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    limit: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn exceeded_by(&self, tokens: usize) -> bool {
        tokens > self.limit
    }

    /// Token count of one embedding input. Oversized inputs are still sent
    /// (the service truncates or rejects them) but logged; an input that
    /// cannot be counted reports zero.
    pub fn measure(&self, input: &str) -> usize {
        match count_tokens(input) {
            Ok(tokens) => {
                if self.exceeded_by(tokens) {
                    warn!(tokens, limit = self.limit, "chunk exceeds embedding input limit");
                }
                tokens
            }
            Err(error) => {
                warn!(%error, "failed to count chunk tokens");
                0
            }
        }
    }
}

/// Document text is counted as plain text: `<|endoftext|>` and friends
/// written in a document are ordinary characters, not control tokens.
pub fn count_tokens(input: &str) -> Result<usize, TokenizerError> {
    Ok(vocabulary()?.encode_ordinary(input).len())
}

fn vocabulary() -> Result<&'static CoreBPE, TokenizerError> {
    static VOCABULARY: OnceLock<Result<CoreBPE, TokenizerError>> = OnceLock::new();
    VOCABULARY
        .get_or_init(|| tiktoken_rs::cl100k_base().map_err(|error| TokenizerError(error.to_string())))
        .as_ref()
        .map_err(Clone::clone)
}
