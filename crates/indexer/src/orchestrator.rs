// Embedding orchestration: chunk a document, embed chunks and title in
// batches, and assemble aligned (chunk, vector) pairs.
//
// A chunk either ends up paired with its own vector or listed in
// `failed_chunks`; vectors are never shifted onto other chunks.

use std::time::Duration;

use quire_common::chunk::chunk_fingerprint;
use quire_common::hash::{sha256_fields, ContentHash};
use quire_common::{plan_chunks, Chunk, ChunkOptions, ChunkStrategy, ContentNode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::QuireConfig;
use crate::embedding::{check_vector, Embedding, EmbeddingClient, EmbeddingError};
use crate::tokens::TokenBudget;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    pub chunking: ChunkOptions,
    pub max_batch_size: usize,
    pub request_timeout: Duration,
    pub max_input_tokens: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&QuireConfig::default())
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &QuireConfig) -> Self {
        Self {
            chunking: config.chunking,
            max_batch_size: config.embedding.max_batch_size.max(1),
            request_timeout: config.embedding.request_timeout(),
            max_input_tokens: config.embedding.max_input_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
    pub token_count: usize,
}

/// Everything produced by one indexing pass over a document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBuild {
    /// Successfully embedded chunks, in document order.
    pub chunks: Vec<EmbeddedChunk>,
    pub title_embedding: Option<Embedding>,
    /// Positions (in the chunk plan) of chunks left without a vector.
    pub failed_chunks: Vec<usize>,
    pub title_failed: bool,
    pub strategy: ChunkStrategy,
    pub fingerprint: ContentHash,
    pub last_error: Option<EmbeddingError>,
}

impl EmbeddingBuild {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty() && !self.title_failed
    }
}

/// Digest of the title plus the chunk plan; equal digests mean the stored
/// index is still accurate.
pub fn build_fingerprint(title: &str, chunks: &[Chunk]) -> ContentHash {
    sha256_fields([title, chunk_fingerprint(chunks).as_str()])
}

/// Chunk `tree` and embed every chunk plus the title.
///
/// Failed chunks are retried once in a single call; anything still failing
/// is reported in `failed_chunks`.
pub async fn build_embeddings<C>(
    client: &C,
    title: &str,
    tree: &ContentNode,
    options: &OrchestratorOptions,
) -> EmbeddingBuild
where
    C: EmbeddingClient + ?Sized,
{
    let plan = plan_chunks(tree, &options.chunking);
    let fingerprint = build_fingerprint(title, &plan.chunks);
    let inputs: Vec<String> = plan.chunks.iter().map(Chunk::embedding_input).collect();
    let budget = TokenBudget::new(options.max_input_tokens);
    let token_counts: Vec<usize> = inputs.iter().map(|input| budget.measure(input)).collect();

    let mut batch = EmbeddingBatch::new(inputs.len());
    let all: Vec<usize> = (0..inputs.len()).collect();
    batch.run(client, &inputs, &all, options.max_batch_size, options.request_timeout).await;

    let pending = batch.pending();
    if !pending.is_empty() {
        info!(failed = pending.len(), "retrying failed chunk embeddings");
        batch.run(client, &inputs, &pending, pending.len(), options.request_timeout).await;
    }

    let (title_embedding, title_error) = embed_title(client, title, batch.dimension, options).await;
    let title_failed = title_error.is_some();
    let last_error = title_error.or(batch.last_error);
    let failed_chunks: Vec<usize> =
        batch.vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
    if !failed_chunks.is_empty() {
        warn!(failed = failed_chunks.len(), total = plan.chunks.len(), "chunk embeddings failed after retry");
    }

    let chunks = plan
        .chunks
        .into_iter()
        .zip(batch.vectors)
        .zip(token_counts)
        .filter_map(|((chunk, vector), token_count)| {
            vector.map(|embedding| EmbeddedChunk { chunk, embedding, token_count })
        })
        .collect();

    EmbeddingBuild {
        chunks,
        title_embedding,
        failed_chunks,
        title_failed,
        strategy: plan.strategy,
        fingerprint,
        last_error,
    }
}

/// Per-chunk vector slots filled across attempts.
struct EmbeddingBatch {
    vectors: Vec<Option<Embedding>>,
    dimension: Option<usize>,
    last_error: Option<EmbeddingError>,
}

impl EmbeddingBatch {
    fn new(len: usize) -> Self {
        Self { vectors: vec![None; len], dimension: None, last_error: None }
    }

    fn pending(&self) -> Vec<usize> {
        self.vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect()
    }

    /// Embed the inputs at `indices`, `batch_size` per request.
    async fn run<C>(
        &mut self,
        client: &C,
        inputs: &[String],
        indices: &[usize],
        batch_size: usize,
        timeout: Duration,
    ) where
        C: EmbeddingClient + ?Sized,
    {
        for group in indices.chunks(batch_size.max(1)) {
            let texts = group.iter().map(|&i| inputs[i].clone()).collect();
            let result = match tokio::time::timeout(timeout, client.embed(texts)).await {
                Ok(result) => result,
                Err(_) => Err(EmbeddingError::Timeout { after_ms: timeout.as_millis() as u64 }),
            };
            match result {
                Ok(vectors) if vectors.len() == group.len() => self.accept(group, vectors),
                Ok(vectors) => {
                    self.fail(group, EmbeddingError::Misaligned { expected: group.len(), actual: vectors.len() })
                }
                Err(error) => self.fail(group, error),
            }
        }
    }

    fn accept(&mut self, group: &[usize], vectors: Vec<Embedding>) {
        if self.dimension.is_none() {
            self.dimension = common_dimension(&vectors);
        }
        for (&index, vector) in group.iter().zip(vectors) {
            match check_vector(index, &vector, self.dimension) {
                Ok(()) => {
                    self.vectors[index] = Some(vector);
                }
                Err(error) => {
                    debug!(chunk = index, error = %error, "discarding embedding");
                    self.last_error = Some(error);
                }
            }
        }
    }

    fn fail(&mut self, group: &[usize], error: EmbeddingError) {
        warn!(chunks = ?group, error = %error, "embedding request failed");
        self.last_error = Some(error);
    }
}

/// Length shared by most vectors of a response; ties go to the length seen
/// first.
fn common_dimension(vectors: &[Embedding]) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for vector in vectors.iter().filter(|vector| !vector.is_empty()) {
        match counts.iter_mut().find(|(len, _)| *len == vector.len()) {
            Some((_, seen)) => *seen += 1,
            None => counts.push((vector.len(), 1)),
        }
    }
    counts.into_iter().rev().max_by_key(|&(_, seen)| seen).map(|(len, _)| len)
}

async fn embed_title<C>(
    client: &C,
    title: &str,
    dimension: Option<usize>,
    options: &OrchestratorOptions,
) -> (Option<Embedding>, Option<EmbeddingError>)
where
    C: EmbeddingClient + ?Sized,
{
    if title.trim().is_empty() {
        return (None, None);
    }
    let mut last_error = None;
    for attempt in 0..2 {
        let result = match tokio::time::timeout(options.request_timeout, client.embed_title(title.to_string())).await
        {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout { after_ms: options.request_timeout.as_millis() as u64 }),
        };
        match result.and_then(|vector| check_vector(0, &vector, dimension).map(|()| vector)) {
            Ok(vector) => return (Some(vector), None),
            Err(error) => {
                warn!(attempt, error = %error, "title embedding failed");
                last_error = Some(error);
            }
        }
    }
    (None, last_error)
}
