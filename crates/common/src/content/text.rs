// Plain-text serialization of a document tree.
//
// The serializer and the patcher's position index are both fed by `walk`,
// so a flat offset computed by one always means the same thing to the other.

use super::ContentNode;

/// What a text-bearing block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    /// Heading or paragraph: a sequence of text runs.
    Inline,
    /// Code block: a single text value owned by the block itself.
    Code,
}

/// Receiver for the flattened text of a tree, in document order.
pub(crate) trait TextSink {
    fn begin_block(&mut self, _path: &[usize], _kind: BlockKind) {}
    fn end_block(&mut self) {}
    /// Text owned by the node at `path` (a run, or a code block).
    fn push_run(&mut self, path: &[usize], text: &str);
    fn push_newline(&mut self);
    fn ends_with_newline(&self) -> bool;
}

impl TextSink for String {
    fn push_run(&mut self, _path: &[usize], text: &str) {
        self.push_str(text);
    }

    fn push_newline(&mut self) {
        self.push('\n');
    }

    fn ends_with_newline(&self) -> bool {
        self.ends_with('\n')
    }
}

/// Walk `node` (located at `path`) depth-first, feeding its text to `sink`.
pub(crate) fn walk(node: &ContentNode, path: &mut Vec<usize>, sink: &mut impl TextSink) {
    match node {
        ContentNode::Heading { children, .. } | ContentNode::Paragraph { children } => {
            sink.begin_block(path, BlockKind::Inline);
            for (index, child) in children.iter().enumerate() {
                match child {
                    ContentNode::Text { text, .. } => {
                        path.push(index);
                        sink.push_run(path, text);
                        path.pop();
                    }
                    child if is_line_break(child) => sink.push_newline(),
                    _ => {}
                }
            }
            sink.end_block();
            sink.push_newline();
        }
        ContentNode::CodeBlock { text, .. } => {
            sink.begin_block(path, BlockKind::Code);
            sink.push_run(path, text);
            sink.end_block();
            sink.push_newline();
        }
        ContentNode::ListItem { children } => {
            walk_children(children, path, sink);
            if !sink.ends_with_newline() {
                sink.push_newline();
            }
        }
        ContentNode::Document { children }
        | ContentNode::BulletList { children }
        | ContentNode::OrderedList { children }
        | ContentNode::Blockquote { children } => walk_children(children, path, sink),
        ContentNode::Text { text, .. } => sink.push_run(path, text),
        ContentNode::Unknown { .. } => {}
    }
}

/// An inline `hardBreak`. It renders as `\n` inside its block but owns no
/// run, so edits can delete it and never write into it.
pub(crate) fn is_line_break(node: &ContentNode) -> bool {
    matches!(node, ContentNode::Unknown { .. }) && node.kind_name() == "hardBreak"
}

fn walk_children(children: &[ContentNode], path: &mut Vec<usize>, sink: &mut impl TextSink) {
    for (index, child) in children.iter().enumerate() {
        path.push(index);
        walk(child, path, sink);
        path.pop();
    }
}

/// Flatten a tree or subtree to plain text. Marks are dropped and every
/// block ends with exactly one newline.
pub fn serialize_to_plain_text(node: &ContentNode) -> String {
    let mut out = String::new();
    walk(node, &mut Vec::new(), &mut out);
    out
}

/// Flatten a run of sibling nodes as if they were one subtree.
pub(crate) fn serialize_nodes(nodes: &[ContentNode]) -> String {
    let mut out = String::new();
    walk_children(nodes, &mut Vec::new(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::content::Mark;

    #[test]
    fn blocks_end_with_a_single_newline() {
        let doc = ContentNode::doc(vec![
            ContentNode::heading(1, "Plan"),
            ContentNode::paragraph("First."),
            ContentNode::code_block(None, "let x = 1;"),
        ]);
        assert_eq!(serialize_to_plain_text(&doc), "Plan\nFirst.\nlet x = 1;\n");
    }

    #[test]
    fn marks_are_stripped() {
        let doc = ContentNode::doc(vec![ContentNode::paragraph_with(vec![
            ContentNode::text("Ship "),
            ContentNode::marked("the api", [Mark::Bold, Mark::Link { href: "https://x".into() }]),
            ContentNode::text(" soon"),
        ])]);
        assert_eq!(serialize_to_plain_text(&doc), "Ship the api soon\n");
    }

    #[test]
    fn list_items_do_not_double_newlines() {
        let doc = ContentNode::doc(vec![
            ContentNode::bullet_list(&["one", "two"]),
            ContentNode::ordered_list(&["three"]),
        ]);
        assert_eq!(serialize_to_plain_text(&doc), "one\ntwo\nthree\n");
    }

    #[test]
    fn empty_list_item_still_ends_its_line() {
        let doc = ContentNode::doc(vec![ContentNode::BulletList {
            children: vec![ContentNode::ListItem { children: vec![] }],
        }]);
        assert_eq!(serialize_to_plain_text(&doc), "\n");
    }

    #[test]
    fn unknown_nodes_emit_nothing() {
        let doc = ContentNode::doc(vec![
            ContentNode::Unknown { raw: json!({ "type": "image", "attrs": { "src": "a.png" } }) },
            ContentNode::paragraph_with(vec![
                ContentNode::text("hi "),
                ContentNode::Unknown { raw: json!({ "type": "mention" }) },
                ContentNode::text("there"),
            ]),
        ]);
        assert_eq!(serialize_to_plain_text(&doc), "hi there\n");
    }

    #[test]
    fn hard_break_separates_runs() {
        let doc = ContentNode::doc(vec![ContentNode::paragraph_with(vec![
            ContentNode::text("first line"),
            ContentNode::Unknown { raw: json!({ "type": "hardBreak" }) },
            ContentNode::text("second line"),
        ])]);
        assert_eq!(serialize_to_plain_text(&doc), "first line\nsecond line\n");
    }

    #[test]
    fn blockquote_contents_are_serialized() {
        let doc = ContentNode::doc(vec![ContentNode::Blockquote {
            children: vec![ContentNode::paragraph("quoted")],
        }]);
        assert_eq!(serialize_to_plain_text(&doc), "quoted\n");
    }

    #[test]
    fn serialization_is_deterministic() {
        let doc = ContentNode::doc(vec![
            ContentNode::heading(2, "A"),
            ContentNode::bullet_list(&["x", "y"]),
        ]);
        assert_eq!(serialize_to_plain_text(&doc), serialize_to_plain_text(&doc));
    }

    #[test]
    fn serialize_nodes_matches_subtree_serialization() {
        let nodes = vec![ContentNode::paragraph("a"), ContentNode::paragraph("b")];
        assert_eq!(serialize_nodes(&nodes), "a\nb\n");
        assert_eq!(serialize_nodes(&nodes), serialize_to_plain_text(&ContentNode::doc(nodes.clone())));
    }
}
