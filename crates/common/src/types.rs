// Domain types produced and consumed by the content pipeline.

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// A heading-bounded span of the document's top-level nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    /// Heading texts from the outermost open heading down to this one.
    pub heading_path: Vec<String>,
    /// Levels parallel to `heading_path`.
    pub heading_levels: Vec<u8>,
    /// Child index of the heading within the document root.
    pub start_node_index: usize,
    /// Child index of the last node in the section (inclusive).
    pub end_node_index: usize,
    /// `heading_path` joined with `" > "`.
    pub breadcrumb: String,
    /// Hex SHA-256 of `breadcrumb`.
    pub breadcrumb_hash: String,
}

impl Section {
    pub fn heading(&self) -> &str {
        self.heading_path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn level(&self) -> u8 {
        self.heading_levels.last().copied().unwrap_or_default()
    }

    /// Number of top-level nodes after the heading.
    pub fn body_len(&self) -> usize {
        self.end_node_index - self.start_node_index
    }
}

/// A bounded unit of plain text prepared for embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// Window ordinal; set only for fixed-size chunks.
    pub index: Option<usize>,
    pub heading: Option<String>,
    pub heading_level: Option<u8>,
    pub header_breadcrumb: Option<String>,
    #[serde(default)]
    pub breadcrumb_hash: Option<String>,
}

impl Chunk {
    pub fn simple(index: usize, content: String) -> Self {
        Self {
            content,
            index: Some(index),
            heading: None,
            heading_level: None,
            header_breadcrumb: None,
            breadcrumb_hash: None,
        }
    }

    /// Text sent to the embedding service: breadcrumb line, then content.
    pub fn embedding_input(&self) -> String {
        match &self.header_breadcrumb {
            Some(breadcrumb) => format!("{breadcrumb}\n{}", self.content),
            None => self.content.clone(),
        }
    }
}

/// A proposed search/replace edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRequest {
    pub search: String,
    pub replace: String,
    /// Allow the fallback matcher when there is no unique exact match.
    #[serde(default)]
    pub overwrite: bool,
}

impl ChangeRequest {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self { search: search.into(), replace: replace.into(), overwrite: false }
    }

    pub fn overwriting(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// Final state of one change request in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    Applied { via_fallback: bool },
    /// The located text already equals the replacement.
    Unchanged,
    Failed { error: MatchError, fallback_attempted: bool },
    /// The edit would have broken the tree; the batch stopped here.
    Aborted { reason: String },
    /// Never started because the batch stopped or was cancelled.
    Skipped,
}

impl ChangeStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Unchanged)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// Position of the change in the submitted batch.
    pub index: usize,
    #[serde(flatten)]
    pub status: ChangeStatus,
}

/// Result of one patch batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResult {
    pub success: bool,
    pub applied_changes: usize,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The batch stopped before every change was attempted.
    pub halted: bool,
    pub outcomes: Vec<ChangeOutcome>,
}

impl ApplyResult {
    /// Aggregate per-change outcomes. `halt_reason` is set when the batch
    /// stopped early (hard failure or cancellation).
    pub fn from_outcomes(outcomes: Vec<ChangeOutcome>, halt_reason: Option<String>) -> Self {
        let applied_changes = outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, ChangeStatus::Applied { .. }))
            .count();
        let used_fallback = outcomes.iter().any(|outcome| {
            matches!(
                outcome.status,
                ChangeStatus::Applied { via_fallback: true }
                    | ChangeStatus::Failed { fallback_attempted: true, .. }
            )
        });
        let satisfied = outcomes.iter().filter(|outcome| outcome.status.is_satisfied()).count();
        let halted = halt_reason.is_some();
        let error = match halt_reason {
            Some(reason) => Some(reason),
            None if satisfied < outcomes.len() => Some(format!(
                "{} of {} changes could not be applied",
                outcomes.len() - satisfied,
                outcomes.len()
            )),
            None => None,
        };

        Self {
            success: !halted && satisfied == outcomes.len(),
            applied_changes,
            used_fallback,
            error,
            halted,
            outcomes,
        }
    }

    pub fn status(&self) -> ApplyStatus {
        let total = self.outcomes.len();
        let satisfied = self.outcomes.iter().filter(|outcome| outcome.status.is_satisfied()).count();
        if total == 0 {
            ApplyStatus::NothingToApply
        } else if self.halted {
            ApplyStatus::Aborted { applied: self.applied_changes, total }
        } else if satisfied == total {
            ApplyStatus::AllApplied
        } else if self.applied_changes == 0 {
            ApplyStatus::NoneApplied
        } else {
            ApplyStatus::Partial { applied: self.applied_changes, total }
        }
    }
}

/// User-facing summary of a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyStatus {
    NothingToApply,
    AllApplied,
    Partial { applied: usize, total: usize },
    NoneApplied,
    Aborted { applied: usize, total: usize },
}
