// Content patcher: applies search/replace change requests to a live tree.
//
// Each change runs through `ChangeState` until it reaches `Finished`. The
// flat text and its block spans come from one `PositionIndex` built per
// batch and refreshed in place after every edit.

mod edit;
pub mod fuzzy;
mod index;

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use self::edit::replace_in_block;
pub use self::fuzzy::{FallbackMatcher, FallbackRequest, FuzzyMatcher, NoFallback};
use self::index::PositionIndex;
use crate::content::ContentNode;
use crate::error::{MatchError, StructuralError};
use crate::types::{ApplyResult, ChangeOutcome, ChangeRequest, ChangeStatus};

/// Progress of a single change request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChangeState {
    Searching,
    /// No unique exact match; `candidates` holds any exact occurrences.
    Unmatched { error: MatchError, candidates: Vec<Range<usize>> },
    FallbackAttempt { error: MatchError, candidates: Vec<Range<usize>> },
    Located { span: Range<usize>, via_fallback: bool },
    Finished(ChangeStatus),
}

/// Applies change batches with a configurable fallback strategy.
pub struct Patcher<'a> {
    fallback: Box<dyn FallbackMatcher + 'a>,
    cancel: Option<&'a AtomicBool>,
}

impl Default for Patcher<'_> {
    fn default() -> Self {
        Self { fallback: Box::new(FuzzyMatcher::default()), cancel: None }
    }
}

impl<'a> Patcher<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: impl FallbackMatcher + 'a) -> Self {
        self.fallback = Box::new(fallback);
        self
    }

    /// Changes not yet started when `flag` is set are skipped.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Apply `changes` in order.
    ///
    /// Match failures are recorded per change and do not stop the batch. A
    /// structural failure stops it and leaves the tree as the last
    /// successful edit left it.
    pub fn apply(&self, tree: &mut ContentNode, changes: &[ChangeRequest]) -> ApplyResult {
        if changes.is_empty() {
            return ApplyResult::from_outcomes(Vec::new(), None);
        }
        if let Err(error) = tree.validate() {
            warn!(error = %error, "refusing to patch an invalid tree");
            let outcomes = skipped_from(0, changes.len());
            return ApplyResult::from_outcomes(outcomes, Some(error.to_string()));
        }

        let mut index = PositionIndex::build(tree);
        let mut outcomes = Vec::with_capacity(changes.len());

        for (position, change) in changes.iter().enumerate() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                info!(remaining = changes.len() - position, "patch batch cancelled");
                outcomes.extend(skipped_from(position, changes.len()));
                return ApplyResult::from_outcomes(outcomes, Some("patch batch cancelled".into()));
            }

            match self.run_change(tree, &mut index, change) {
                Ok(status) => {
                    debug!(change = position, status = ?status, "change processed");
                    outcomes.push(ChangeOutcome { index: position, status });
                }
                Err(error) => {
                    warn!(change = position, error = %error, "patch batch halted");
                    outcomes.push(ChangeOutcome {
                        index: position,
                        status: ChangeStatus::Aborted { reason: error.to_string() },
                    });
                    outcomes.extend(skipped_from(position + 1, changes.len()));
                    return ApplyResult::from_outcomes(outcomes, Some(error.to_string()));
                }
            }
        }

        ApplyResult::from_outcomes(outcomes, None)
    }

    fn run_change(
        &self,
        tree: &mut ContentNode,
        index: &mut PositionIndex,
        change: &ChangeRequest,
    ) -> Result<ChangeStatus, StructuralError> {
        let mut state = ChangeState::Searching;
        loop {
            state = match state {
                ChangeState::Searching => search(index.text(), &change.search),
                ChangeState::Unmatched { error, candidates } => {
                    if change.overwrite {
                        ChangeState::FallbackAttempt { error, candidates }
                    } else {
                        ChangeState::Finished(ChangeStatus::Failed { error, fallback_attempted: false })
                    }
                }
                ChangeState::FallbackAttempt { error, candidates } => {
                    let request = FallbackRequest {
                        text: index.text(),
                        search: &change.search,
                        candidates: &candidates,
                    };
                    match self.fallback.locate(&request) {
                        Some(span) if is_valid_span(index.text(), &span) => {
                            ChangeState::Located { span, via_fallback: true }
                        }
                        _ => ChangeState::Finished(ChangeStatus::Failed { error, fallback_attempted: true }),
                    }
                }
                ChangeState::Located { span, via_fallback } => {
                    ChangeState::Finished(apply_at(tree, index, span, &change.replace, via_fallback)?)
                }
                ChangeState::Finished(status) => return Ok(status),
            };
        }
    }
}

/// Apply `changes` with the default fuzzy fallback.
pub fn apply_changes(tree: &mut ContentNode, changes: &[ChangeRequest]) -> ApplyResult {
    Patcher::default().apply(tree, changes)
}

fn search(text: &str, needle: &str) -> ChangeState {
    if needle.is_empty() {
        return ChangeState::Finished(ChangeStatus::Failed {
            error: MatchError::EmptySearch,
            fallback_attempted: false,
        });
    }
    let mut matches = find_all(text, needle);
    match matches.len() {
        1 => ChangeState::Located { span: matches.remove(0), via_fallback: false },
        0 => ChangeState::Unmatched { error: MatchError::NotFound, candidates: matches },
        count => ChangeState::Unmatched { error: MatchError::Ambiguous { matches: count }, candidates: matches },
    }
}

/// Every occurrence of `needle`, overlapping ones included.
fn find_all(text: &str, needle: &str) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find(needle) {
        let start = from + offset;
        found.push(start..start + needle.len());
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    found
}

fn is_valid_span(text: &str, span: &Range<usize>) -> bool {
    span.start < span.end
        && span.end <= text.len()
        && text.is_char_boundary(span.start)
        && text.is_char_boundary(span.end)
}

fn apply_at(
    tree: &mut ContentNode,
    index: &mut PositionIndex,
    span: Range<usize>,
    replacement: &str,
    via_fallback: bool,
) -> Result<ChangeStatus, StructuralError> {
    let location = match index.locate(&span) {
        Ok(location) => location,
        Err(error) => {
            return Ok(ChangeStatus::Failed { error, fallback_attempted: via_fallback });
        }
    };
    if &index.text()[span.clone()] == replacement {
        return Ok(ChangeStatus::Unchanged);
    }

    let path = index.block(location.block).path.clone();
    debug!(path = ?path, runs = index.runs_touched(&location), "replacing text");
    let block = tree
        .node_at(&path)
        .ok_or_else(|| StructuralError::new(&path, "indexed block is missing from the tree"))?;
    let edited = replace_in_block(block, &path, location.local, replacement)?;

    index.refresh_block(location.block, &edited);
    if let Some(slot) = tree.node_at_mut(&path) {
        *slot = edited;
    }
    Ok(ChangeStatus::Applied { via_fallback })
}

fn skipped_from(start: usize, end: usize) -> Vec<ChangeOutcome> {
    (start..end).map(|index| ChangeOutcome { index, status: ChangeStatus::Skipped }).collect()
}
