// Document tree model.
//
// A rich document is a closed sum type with one variant per node kind the
// pipeline interprets, plus `Unknown` carrying the raw wire value of
// anything else so it survives a round trip untouched.

pub mod json;
pub mod text;

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::StructuralError;

/// Inline formatting applied to a text run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Strike,
    Code,
    Link { href: String },
    /// A mark kind the pipeline does not interpret, kept as its JSON text.
    Other(String),
}

/// The set of marks on a text run.
pub type MarkSet = BTreeSet<Mark>;

/// A node of the rich document tree.
///
/// Only `Text` and `CodeBlock` carry text; every other interpreted kind has
/// ordered children. `Unknown` is opaque: its children, if any, live inside
/// `raw` and are never walked.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Document { children: Vec<ContentNode> },
    Heading { level: u8, children: Vec<ContentNode> },
    Paragraph { children: Vec<ContentNode> },
    BulletList { children: Vec<ContentNode> },
    OrderedList { children: Vec<ContentNode> },
    ListItem { children: Vec<ContentNode> },
    Blockquote { children: Vec<ContentNode> },
    CodeBlock { language: Option<String>, text: String },
    Text { text: String, marks: MarkSet },
    Unknown { raw: Value },
}

impl ContentNode {
    pub fn doc(children: Vec<ContentNode>) -> Self {
        Self::Document { children }
    }

    /// A heading holding a single unmarked text run.
    pub fn heading(level: u8, text: &str) -> Self {
        Self::Heading { level, children: text_children(text) }
    }

    /// A paragraph holding a single unmarked text run.
    pub fn paragraph(text: &str) -> Self {
        Self::Paragraph { children: text_children(text) }
    }

    pub fn paragraph_with(children: Vec<ContentNode>) -> Self {
        Self::Paragraph { children }
    }

    pub fn text(text: &str) -> Self {
        Self::Text { text: text.to_string(), marks: MarkSet::new() }
    }

    pub fn marked(text: &str, marks: impl IntoIterator<Item = Mark>) -> Self {
        Self::Text { text: text.to_string(), marks: marks.into_iter().collect() }
    }

    pub fn code_block(language: Option<&str>, text: &str) -> Self {
        Self::CodeBlock { language: language.map(str::to_string), text: text.to_string() }
    }

    /// A bullet list with one paragraph per item.
    pub fn bullet_list(items: &[&str]) -> Self {
        Self::BulletList { children: list_items(items) }
    }

    /// An ordered list with one paragraph per item.
    pub fn ordered_list(items: &[&str]) -> Self {
        Self::OrderedList { children: list_items(items) }
    }

    /// Wire type name, used in diagnostics and JSON mapping.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Document { .. } => "doc",
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::BulletList { .. } => "bulletList",
            Self::OrderedList { .. } => "orderedList",
            Self::ListItem { .. } => "listItem",
            Self::Blockquote { .. } => "blockquote",
            Self::CodeBlock { .. } => "codeBlock",
            Self::Text { .. } => "text",
            Self::Unknown { raw } => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Ordered children; empty for leaves and opaque nodes.
    pub fn children(&self) -> &[ContentNode] {
        match self {
            Self::Document { children }
            | Self::Heading { children, .. }
            | Self::Paragraph { children }
            | Self::BulletList { children }
            | Self::OrderedList { children }
            | Self::ListItem { children }
            | Self::Blockquote { children } => children,
            Self::CodeBlock { .. } | Self::Text { .. } | Self::Unknown { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ContentNode>> {
        match self {
            Self::Document { children }
            | Self::Heading { children, .. }
            | Self::Paragraph { children }
            | Self::BulletList { children }
            | Self::OrderedList { children }
            | Self::ListItem { children }
            | Self::Blockquote { children } => Some(children),
            Self::CodeBlock { .. } | Self::Text { .. } | Self::Unknown { .. } => None,
        }
    }

    /// Concatenated text of all runs and code below this node, without separators.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Look up a descendant by child-index path.
    pub fn node_at(&self, path: &[usize]) -> Option<&ContentNode> {
        path.iter().try_fold(self, |node, &index| node.children().get(index))
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut ContentNode> {
        let mut node = self;
        for &index in path {
            node = node.children_mut()?.get_mut(index)?;
        }
        Some(node)
    }

    /// Check the structural invariants of a whole document.
    ///
    /// Reports the first violation found in pre-order.
    pub fn validate(&self) -> Result<(), StructuralError> {
        validate_node(self, &mut Vec::new(), Context::Root)
    }
}

/// Validate `node` as a block sitting at `path` inside a block container.
pub(crate) fn validate_block(node: &ContentNode, path: &[usize]) -> Result<(), StructuralError> {
    validate_node(node, &mut path.to_vec(), Context::Block)
}

fn text_children(text: &str) -> Vec<ContentNode> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ContentNode::text(text)]
    }
}

fn list_items(items: &[&str]) -> Vec<ContentNode> {
    items
        .iter()
        .map(|item| ContentNode::ListItem { children: vec![ContentNode::paragraph(item)] })
        .collect()
}

fn collect_text(node: &ContentNode, out: &mut String) {
    match node {
        ContentNode::Text { text, .. } | ContentNode::CodeBlock { text, .. } => out.push_str(text),
        _ => node.children().iter().for_each(|child| collect_text(child, out)),
    }
}

// ── Validation ───────────────────────────────────────────────────────

/// Where a node sits, which decides what kinds it may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Root,
    Block,
    List,
    Inline,
}

fn validate_node(
    node: &ContentNode,
    path: &mut Vec<usize>,
    context: Context,
) -> Result<(), StructuralError> {
    let allowed = match (context, node) {
        (Context::Root, ContentNode::Document { .. }) => true,
        (Context::Root, _) => {
            return Err(StructuralError::new(
                path,
                format!("root must be a doc node, found {}", node.kind_name()),
            ));
        }
        (_, ContentNode::Document { .. }) => false,
        (Context::Block, ContentNode::ListItem { .. } | ContentNode::Text { .. }) => false,
        (Context::Block, _) => true,
        (Context::List, node) => matches!(node, ContentNode::ListItem { .. }),
        (Context::Inline, node) => {
            matches!(node, ContentNode::Text { .. } | ContentNode::Unknown { .. })
        }
    };
    if !allowed {
        let place = match context {
            Context::Root | Context::Block => "a block container",
            Context::List => "a list",
            Context::Inline => "inline content",
        };
        return Err(StructuralError::new(
            path,
            format!("{} cannot appear inside {place}", node.kind_name()),
        ));
    }

    match node {
        ContentNode::Heading { level, .. } if !(1..=6).contains(level) => {
            return Err(StructuralError::new(
                path,
                format!("heading level {level} is out of range 1..=6"),
            ));
        }
        ContentNode::Text { text, .. } if text.is_empty() => {
            return Err(StructuralError::new(path, "empty text run"));
        }
        _ => {}
    }

    let child_context = match node {
        ContentNode::Document { .. } | ContentNode::Blockquote { .. } | ContentNode::ListItem { .. } => {
            Context::Block
        }
        ContentNode::BulletList { .. } | ContentNode::OrderedList { .. } => Context::List,
        ContentNode::Heading { .. } | ContentNode::Paragraph { .. } => Context::Inline,
        ContentNode::CodeBlock { .. } | ContentNode::Text { .. } | ContentNode::Unknown { .. } => {
            return Ok(());
        }
    };

    for (index, child) in node.children().iter().enumerate() {
        path.push(index);
        validate_node(child, path, child_context)?;
        path.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> ContentNode {
        ContentNode::doc(vec![
            ContentNode::heading(1, "Plan"),
            ContentNode::paragraph_with(vec![
                ContentNode::text("Ship "),
                ContentNode::marked("the api", [Mark::Bold]),
                ContentNode::text(" by friday."),
            ]),
            ContentNode::bullet_list(&["one", "two"]),
            ContentNode::code_block(Some("rust"), "fn main() {}"),
        ])
    }

    #[test]
    fn valid_document_passes_validation() {
        sample().validate().expect("sample document should be valid");
    }

    #[test]
    fn text_content_concatenates_runs() {
        let doc = sample();
        assert_eq!(doc.children()[1].text_content(), "Ship the api by friday.");
        assert_eq!(doc.children()[3].text_content(), "fn main() {}");
    }

    #[test]
    fn node_at_follows_child_indices() {
        let doc = sample();
        let node = doc.node_at(&[2, 1, 0, 0]).expect("path should resolve");
        assert_eq!(node, &ContentNode::text("two"));
        assert!(doc.node_at(&[9]).is_none());
        assert!(doc.node_at(&[3, 0]).is_none(), "code blocks have no children");
    }

    #[test]
    fn node_at_mut_allows_in_place_edit() {
        let mut doc = sample();
        *doc.node_at_mut(&[0]).unwrap() = ContentNode::heading(2, "Plan B");
        assert_eq!(doc.children()[0].text_content(), "Plan B");
    }

    #[test]
    fn rejects_non_document_root() {
        let error = ContentNode::paragraph("loose").validate().unwrap_err();
        assert!(error.reason.contains("root must be a doc"), "{error}");
    }

    #[test]
    fn rejects_heading_level_out_of_range() {
        let doc = ContentNode::doc(vec![ContentNode::heading(7, "Too deep")]);
        let error = doc.validate().unwrap_err();
        assert_eq!(error.path.0, vec![0]);
        assert!(error.reason.contains("heading level 7"));
    }

    #[test]
    fn rejects_text_directly_under_document() {
        let doc = ContentNode::doc(vec![ContentNode::text("stray")]);
        let error = doc.validate().unwrap_err();
        assert!(error.reason.contains("text cannot appear inside a block container"));
    }

    #[test]
    fn rejects_list_item_outside_list_and_paragraph_inside_list() {
        let item = ContentNode::ListItem { children: vec![ContentNode::paragraph("x")] };
        let doc = ContentNode::doc(vec![item]);
        assert!(doc.validate().is_err());

        let list = ContentNode::BulletList { children: vec![ContentNode::paragraph("x")] };
        let error = ContentNode::doc(vec![list]).validate().unwrap_err();
        assert!(error.reason.contains("inside a list"));
    }

    #[test]
    fn rejects_empty_text_runs() {
        let doc = ContentNode::doc(vec![ContentNode::paragraph_with(vec![ContentNode::text("")])]);
        let error = doc.validate().unwrap_err();
        assert_eq!(error.path.0, vec![0, 0]);
    }

    #[test]
    fn unknown_nodes_are_allowed_in_blocks_and_inline() {
        let doc = ContentNode::doc(vec![
            ContentNode::Unknown { raw: json!({ "type": "horizontalRule" }) },
            ContentNode::paragraph_with(vec![
                ContentNode::text("see "),
                ContentNode::Unknown { raw: json!({ "type": "mention", "attrs": { "id": "u1" } }) },
            ]),
        ]);
        doc.validate().expect("unknown nodes should be tolerated");
        assert_eq!(doc.children()[0].kind_name(), "horizontalRule");
    }

    #[test]
    fn marks_form_a_set() {
        let node = ContentNode::marked("x", [Mark::Bold, Mark::Italic, Mark::Bold]);
        let ContentNode::Text { marks, .. } = node else { panic!("expected text") };
        assert_eq!(marks.len(), 2);
    }
}
