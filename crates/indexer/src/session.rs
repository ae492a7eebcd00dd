// Editing session: owns one document tree, applies patch batches to it and
// triggers re-indexing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use quire_common::patch::{FuzzyMatcher, NoFallback};
use quire_common::{plan_chunks, ApplyResult, ChangeRequest, ChunkStrategy, ContentNode, Patcher};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::orchestrator::{build_embeddings, build_fingerprint, OrchestratorOptions};
use crate::store::ChunkSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReindexOutcome {
    /// Stored chunks already match the document.
    Skipped,
    Indexed { chunks: usize, strategy: ChunkStrategy },
    /// Embedding failed for some chunks or the title; the stored index was
    /// left as it was.
    Deferred { failed_chunks: Vec<usize>, title_failed: bool },
}

#[derive(Debug)]
pub struct DocumentSession {
    pub doc_id: Uuid,
    pub title: String,
    tree: ContentNode,
    cancel: Arc<AtomicBool>,
    matcher: Option<FuzzyMatcher>,
}

impl DocumentSession {
    pub fn new(doc_id: Uuid, title: impl Into<String>, tree: ContentNode) -> Self {
        Self {
            doc_id,
            title: title.into(),
            tree,
            cancel: Arc::new(AtomicBool::new(false)),
            matcher: Some(FuzzyMatcher::default()),
        }
    }

    /// Fallback used by `overwrite` changes; `None` disables it.
    pub fn with_matcher(mut self, matcher: Option<FuzzyMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn tree(&self) -> &ContentNode {
        &self.tree
    }

    pub fn into_tree(self) -> ContentNode {
        self.tree
    }

    /// Flag that stops a running batch before its next change.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// Apply a change batch and mark the index outdated if anything changed.
    pub fn apply(&mut self, changes: &[ChangeRequest], sink: &mut dyn ChunkSink) -> Result<ApplyResult> {
        let patcher = Patcher::new().with_cancel_flag(self.cancel.as_ref());
        let patcher = match self.matcher {
            Some(matcher) => patcher.with_fallback(matcher),
            None => patcher.with_fallback(NoFallback),
        };
        let result = patcher.apply(&mut self.tree, changes);

        info!(
            doc_id = %self.doc_id,
            applied = result.applied_changes,
            total = changes.len(),
            halted = result.halted,
            "applied change batch"
        );
        if result.applied_changes > 0 {
            sink.mark_index_outdated(self.doc_id)
                .with_context(|| format!("failed to mark index outdated for `{}`", self.doc_id))?;
        }
        Ok(result)
    }

    /// Re-chunk and re-embed the document unless the stored index is current.
    pub async fn reindex<C>(
        &self,
        client: &C,
        sink: &mut dyn ChunkSink,
        options: &OrchestratorOptions,
    ) -> Result<ReindexOutcome>
    where
        C: EmbeddingClient + ?Sized,
    {
        let plan = plan_chunks(&self.tree, &options.chunking);
        let fingerprint = build_fingerprint(&self.title, &plan.chunks);
        if let Some(record) = sink.index_record(self.doc_id)? {
            if record.is_current_for(&fingerprint) {
                info!(doc_id = %self.doc_id, "index is current; skipping");
                return Ok(ReindexOutcome::Skipped);
            }
        }

        let build = build_embeddings(client, &self.title, &self.tree, options).await;
        if build.is_complete() {
            sink.save_chunks(self.doc_id, &build)?;
            return Ok(ReindexOutcome::Indexed { chunks: build.chunks.len(), strategy: build.strategy });
        }

        warn!(
            doc_id = %self.doc_id,
            failed = build.failed_chunks.len(),
            title_failed = build.title_failed,
            error = ?build.last_error,
            "document re-index deferred due to embedding service error"
        );
        sink.mark_index_deferred(self.doc_id, &build.failed_chunks)?;
        Ok(ReindexOutcome::Deferred { failed_chunks: build.failed_chunks, title_failed: build.title_failed })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::orchestrator::EmbeddingBuild;
    use crate::store::{IndexRecord, IndexState};

    #[derive(Default)]
    struct MemorySink {
        records: HashMap<Uuid, IndexRecord>,
        saves: usize,
    }

    impl MemorySink {
        fn set(&mut self, doc_id: Uuid, state: IndexState, fingerprint: Option<String>) {
            let chunk_count = self.records.get(&doc_id).map_or(0, |record| record.chunk_count);
            self.records.insert(doc_id, IndexRecord { state, fingerprint, chunk_count, updated_at: Utc::now() });
        }
    }

    impl ChunkSink for MemorySink {
        fn save_chunks(&mut self, doc_id: Uuid, build: &EmbeddingBuild) -> Result<()> {
            anyhow::ensure!(build.is_complete(), "incomplete build");
            self.saves += 1;
            self.set(doc_id, IndexState::Current, Some(build.fingerprint.clone()));
            Ok(())
        }

        fn mark_index_outdated(&mut self, doc_id: Uuid) -> Result<()> {
            let fingerprint = self.records.get(&doc_id).and_then(|record| record.fingerprint.clone());
            self.set(doc_id, IndexState::Outdated, fingerprint);
            Ok(())
        }

        fn mark_index_deferred(&mut self, doc_id: Uuid, failed_chunks: &[usize]) -> Result<()> {
            let fingerprint = self.records.get(&doc_id).and_then(|record| record.fingerprint.clone());
            self.set(doc_id, IndexState::Deferred { failed_chunks: failed_chunks.to_vec() }, fingerprint);
            Ok(())
        }

        fn index_record(&self, doc_id: Uuid) -> Result<Option<IndexRecord>> {
            Ok(self.records.get(&doc_id).cloned())
        }
    }

    fn session() -> DocumentSession {
        DocumentSession::new(
            Uuid::new_v4(),
            "Plan",
            ContentNode::doc(vec![
                ContentNode::heading(1, "Plan"),
                ContentNode::paragraph("ship the api by friday"),
            ]),
        )
    }

    #[test]
    fn applied_changes_mark_index_outdated() {
        let mut session = session();
        let mut sink = MemorySink::default();

        let result = session
            .apply(&[ChangeRequest::new("api by friday", "API by Monday")], &mut sink)
            .expect("apply should succeed");

        assert!(result.success);
        assert_eq!(quire_common::serialize_to_plain_text(session.tree()), "Plan\nship the API by Monday\n");
        assert_eq!(sink.records[&session.doc_id].state, IndexState::Outdated);
    }

    #[test]
    fn failed_batches_leave_index_alone() {
        let mut session = session();
        let mut sink = MemorySink::default();

        let result = session.apply(&[ChangeRequest::new("missing text", "x")], &mut sink).unwrap();

        assert!(!result.success);
        assert!(sink.records.is_empty());
    }

    #[test]
    fn disabled_matcher_rejects_fuzzy_overwrite() {
        let change = ChangeRequest::new("ship teh api", "ship the API").overwriting();
        let mut sink = MemorySink::default();

        let mut exact_only = session().with_matcher(None);
        let result = exact_only.apply(std::slice::from_ref(&change), &mut sink).unwrap();
        assert_eq!(result.applied_changes, 0);

        let mut fuzzy = session();
        let result = fuzzy.apply(&[change], &mut sink).unwrap();
        assert_eq!(result.applied_changes, 1);
        assert!(result.used_fallback);
    }

    #[test]
    fn cancelled_session_skips_batch_until_reset() {
        let mut session = session();
        let mut sink = MemorySink::default();
        session.cancel_handle().store(true, Ordering::SeqCst);

        let result = session.apply(&[ChangeRequest::new("friday", "monday")], &mut sink).unwrap();
        assert_eq!(result.applied_changes, 0);
        assert!(result.halted);

        session.reset_cancel();
        let result = session.apply(&[ChangeRequest::new("friday", "monday")], &mut sink).unwrap();
        assert_eq!(result.applied_changes, 1);
    }
}
