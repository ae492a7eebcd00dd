// Splicing replacement text into a single block.

use std::ops::Range;

use crate::content::text::is_line_break;
use crate::content::{validate_block, ContentNode, MarkSet};
use crate::error::StructuralError;

/// Build the replacement for `block` with `local` (a byte range of the
/// block's own text) replaced by `replacement`. The result is validated
/// before it is returned; the caller swaps it in.
pub(crate) fn replace_in_block(
    block: &ContentNode,
    path: &[usize],
    local: Range<usize>,
    replacement: &str,
) -> Result<ContentNode, StructuralError> {
    let mut edited = block.clone();
    match &mut edited {
        ContentNode::CodeBlock { text, .. } => {
            if local.end > text.len()
                || !text.is_char_boundary(local.start)
                || !text.is_char_boundary(local.end)
            {
                return Err(StructuralError::new(path, "edit range falls outside the code block"));
            }
            text.replace_range(local, replacement);
        }
        ContentNode::Heading { children, .. } | ContentNode::Paragraph { children } => {
            *children = replace_in_runs(children, path, local, replacement)?;
        }
        other => {
            return Err(StructuralError::new(
                path,
                format!("cannot edit text inside a {} node", other.kind_name()),
            ));
        }
    }
    validate_block(&edited, path)?;
    Ok(edited)
}

/// Replace a range spanning one or more text runs.
///
/// Kept prefix and suffix runs retain their marks. The inserted text gets
/// the marks common to every deleted run, or none when the whole block text
/// is replaced. Line breaks inside the range are deleted with it; other
/// opaque inline nodes are never dropped.
fn replace_in_runs(
    children: &[ContentNode],
    path: &[usize],
    local: Range<usize>,
    replacement: &str,
) -> Result<Vec<ContentNode>, StructuralError> {
    let total: usize = children.iter().map(inline_width).sum();
    if local.end > total || local.start >= local.end {
        return Err(StructuralError::new(path, "edit range falls outside the block text"));
    }
    let whole_block = local.start == 0 && local.end == total;

    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut deleted_marks: Option<MarkSet> = None;
    let mut offset = 0;

    for child in children {
        let (start, end) = (offset, offset + inline_width(child));
        offset = end;

        let ContentNode::Text { text, marks } = child else {
            let deleted = start < end && start >= local.start && end <= local.end;
            if deleted {
                continue;
            }
            if start <= local.start && deleted_marks.is_none() {
                before.push(child.clone());
            } else {
                after.push(child.clone());
            }
            continue;
        };

        if end <= local.start {
            before.push(child.clone());
        } else if start >= local.end {
            after.push(child.clone());
        } else {
            let cut_from = local.start.saturating_sub(start);
            let cut_to = (local.end - start).min(text.len());
            if cut_from > 0 {
                before.push(ContentNode::Text { text: text[..cut_from].to_string(), marks: marks.clone() });
            }
            deleted_marks = Some(match deleted_marks {
                None => marks.clone(),
                Some(common) => common.intersection(marks).cloned().collect(),
            });
            if cut_to < text.len() {
                after.push(ContentNode::Text { text: text[cut_to..].to_string(), marks: marks.clone() });
            }
        }
    }

    let inserted_marks = if whole_block { MarkSet::new() } else { deleted_marks.unwrap_or_default() };
    let mut runs = before;
    if !replacement.is_empty() {
        runs.push(ContentNode::Text { text: replacement.to_string(), marks: inserted_marks });
    }
    runs.extend(after);
    Ok(normalize_runs(runs))
}

/// Bytes an inline child contributes to its block's flat text.
fn inline_width(child: &ContentNode) -> usize {
    match child {
        ContentNode::Text { text, .. } => text.len(),
        child if is_line_break(child) => 1,
        _ => 0,
    }
}

/// Merge adjacent runs with identical marks and drop empty runs.
fn normalize_runs(runs: Vec<ContentNode>) -> Vec<ContentNode> {
    let mut merged: Vec<ContentNode> = Vec::with_capacity(runs.len());
    for run in runs {
        if let ContentNode::Text { text, marks } = &run {
            if text.is_empty() {
                continue;
            }
            if let Some(ContentNode::Text { text: previous, marks: previous_marks }) = merged.last_mut() {
                if previous_marks == marks {
                    previous.push_str(text);
                    continue;
                }
            }
        }
        merged.push(run);
    }
    merged
}
