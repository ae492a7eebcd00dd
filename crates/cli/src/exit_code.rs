// Consistent exit codes for the quire CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/config error
//   10 = document is structurally invalid
//   11 = some changes could not be applied
//   12 = no change could be applied (or the batch was aborted)
//   13 = re-index deferred: embedding service failed for some chunks
//   14 = embedding service unreachable or misconfigured

use quire_common::{ApplyStatus, StructuralError};
use quire_indexer::config::ConfigError;
use quire_indexer::{EmbeddingError, ReindexOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    InvalidDocument = 10,
    PartialApply = 11,
    NothingApplied = 12,
    IndexDeferred = 13,
    EmbeddingService = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<StructuralError>().is_some() {
                return Self::InvalidDocument;
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Usage;
            }
            if cause.downcast_ref::<EmbeddingError>().is_some() {
                return Self::EmbeddingService;
            }
        }
        Self::Error
    }

    pub fn from_apply_status(status: &ApplyStatus) -> Self {
        match status {
            ApplyStatus::NothingToApply | ApplyStatus::AllApplied => Self::Success,
            ApplyStatus::Partial { .. } => Self::PartialApply,
            ApplyStatus::NoneApplied | ApplyStatus::Aborted { .. } => Self::NothingApplied,
        }
    }

    pub fn from_reindex(outcome: &ReindexOutcome) -> Self {
        match outcome {
            ReindexOutcome::Skipped | ReindexOutcome::Indexed { .. } => Self::Success,
            ReindexOutcome::Deferred { .. } => Self::IndexDeferred,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}
