// quire-indexer: embedding orchestration, chunk persistence and editing
// sessions on top of quire-common.

pub mod config;
pub mod embedding;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod tokens;

pub use config::QuireConfig;
pub use embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
pub use orchestrator::{build_embeddings, EmbeddedChunk, EmbeddingBuild, OrchestratorOptions};
pub use session::{DocumentSession, ReindexOutcome};
pub use store::{ChunkSink, IndexRecord, IndexState, SqliteChunkStore};
