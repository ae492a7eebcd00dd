// Error taxonomy for the content pipeline.
//
// `StructuralError` is fatal for the operation that hit it. `MatchError`
// is per change request and never aborts a patch batch.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Child-index chain from the document root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath(pub Vec<usize>);

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

/// The tree cannot be walked, mapped or edited safely.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("structural error at {path}: {reason}")]
pub struct StructuralError {
    pub path: NodePath,
    pub reason: String,
}

impl StructuralError {
    pub fn new(path: &[usize], reason: impl Into<String>) -> Self {
        Self { path: NodePath(path.to_vec()), reason: reason.into() }
    }
}

/// Why a single change request could not be located in the document.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchError {
    #[error("text not found")]
    NotFound,
    #[error("ambiguous match ({matches} occurrences)")]
    Ambiguous { matches: usize },
    #[error("match spans multiple blocks")]
    SpansBlocks,
    #[error("search text is empty")]
    EmptySearch,
}
