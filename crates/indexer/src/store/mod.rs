// Persistence for embedded chunks and per-document index state.

pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orchestrator::EmbeddingBuild;

pub use self::sqlite::SqliteChunkStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexState {
    /// Stored chunks match the fingerprint.
    Current,
    /// Content changed since the last successful save.
    Outdated,
    /// The last indexing pass left chunks without vectors; nothing new was
    /// persisted.
    Deferred { failed_chunks: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    #[serde(flatten)]
    pub state: IndexState,
    pub fingerprint: Option<String>,
    pub chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl IndexRecord {
    pub fn is_current_for(&self, fingerprint: &str) -> bool {
        self.state == IndexState::Current && self.fingerprint.as_deref() == Some(fingerprint)
    }
}

/// Destination for indexing results.
pub trait ChunkSink {
    /// Replace every stored chunk of `doc_id` with `build`.
    ///
    /// Incomplete builds are refused so a document never ends up with a
    /// partial chunk set.
    fn save_chunks(&mut self, doc_id: Uuid, build: &EmbeddingBuild) -> Result<()>;

    fn mark_index_outdated(&mut self, doc_id: Uuid) -> Result<()>;

    /// Record a failed pass; previously stored chunks are left untouched.
    fn mark_index_deferred(&mut self, doc_id: Uuid, failed_chunks: &[usize]) -> Result<()>;

    fn index_record(&self, doc_id: Uuid) -> Result<Option<IndexRecord>>;
}
