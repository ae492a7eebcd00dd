// Flat-offset to tree-position index used while patching.

use std::ops::Range;

use crate::content::text::{walk, BlockKind, TextSink};
use crate::content::ContentNode;
use crate::error::MatchError;

/// A text-bearing node and where its text sits in the flat text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSpan {
    pub path: Vec<usize>,
    pub start: usize,
    pub end: usize,
}

/// A heading, paragraph or code block and its runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockSpan {
    pub path: Vec<usize>,
    pub kind: BlockKind,
    pub start: usize,
    pub end: usize,
    pub runs: Vec<RunSpan>,
}

/// Where a flat match lands in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Location {
    pub block: usize,
    /// Match range relative to the start of the block's text.
    pub local: Range<usize>,
}

/// The serialized text of a tree together with the spans of every block.
///
/// Built once per batch; after an edit only the touched block is re-walked
/// and later spans are shifted.
#[derive(Debug, Default, Clone)]
pub(crate) struct PositionIndex {
    text: String,
    blocks: Vec<BlockSpan>,
    open: Option<BlockSpan>,
}

impl TextSink for PositionIndex {
    fn begin_block(&mut self, path: &[usize], kind: BlockKind) {
        self.open = Some(BlockSpan {
            path: path.to_vec(),
            kind,
            start: self.text.len(),
            end: self.text.len(),
            runs: Vec::new(),
        });
    }

    fn end_block(&mut self) {
        if let Some(mut block) = self.open.take() {
            block.end = self.text.len();
            self.blocks.push(block);
        }
    }

    fn push_run(&mut self, path: &[usize], text: &str) {
        let start = self.text.len();
        self.text.push_str(text);
        if let Some(block) = self.open.as_mut() {
            block.runs.push(RunSpan { path: path.to_vec(), start, end: self.text.len() });
        }
    }

    fn push_newline(&mut self) {
        self.text.push('\n');
    }

    fn ends_with_newline(&self) -> bool {
        self.text.ends_with('\n')
    }
}

impl PositionIndex {
    pub fn build(tree: &ContentNode) -> Self {
        let mut index = Self::default();
        walk(tree, &mut Vec::new(), &mut index);
        index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn block(&self, block: usize) -> &BlockSpan {
        &self.blocks[block]
    }

    /// Map a flat range onto the single block containing it.
    pub fn locate(&self, range: &Range<usize>) -> Result<Location, MatchError> {
        let block = self.blocks.partition_point(|block| block.end < range.end);
        match self.blocks.get(block) {
            Some(span) if span.start <= range.start && range.end <= span.end => Ok(Location {
                block,
                local: range.start - span.start..range.end - span.start,
            }),
            _ => Err(MatchError::SpansBlocks),
        }
    }

    /// Runs touched by a located match.
    pub fn runs_touched(&self, location: &Location) -> usize {
        let span = &self.blocks[location.block];
        let start = span.start + location.local.start;
        let end = span.start + location.local.end;
        span.runs.iter().filter(|run| run.start < end && start < run.end).count()
    }

    /// Re-walk the block at `block` after it was replaced by `node`.
    pub fn refresh_block(&mut self, block: usize, node: &ContentNode) {
        let old = &self.blocks[block];
        let (old_start, old_end) = (old.start, old.end);

        let mut fresh = Self::default();
        walk(node, &mut old.path.clone(), &mut fresh);
        let Some(mut span) = fresh.blocks.pop() else {
            return;
        };
        let new_end = old_start + span.end;

        self.text.replace_range(old_start..old_end, &fresh.text[span.start..span.end]);
        span.start = old_start;
        span.end = new_end;
        for run in &mut span.runs {
            run.start += old_start;
            run.end += old_start;
        }
        self.blocks[block] = span;

        for later in &mut self.blocks[block + 1..] {
            later.start = later.start - old_end + new_end;
            later.end = later.end - old_end + new_end;
            for run in &mut later.runs {
                run.start = run.start - old_end + new_end;
                run.end = run.end - old_end + new_end;
            }
        }
    }
}
