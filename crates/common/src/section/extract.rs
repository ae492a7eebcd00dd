use tracing::debug;

use crate::content::ContentNode;
use crate::error::StructuralError;
use crate::hash::sha256_hex;
use crate::types::Section;

pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Split a document into sections at its top-level headings.
///
/// A document without top-level headings yields no sections. Headings
/// nested in lists or blockquotes are body text of the enclosing section.
pub fn extract_sections(tree: &ContentNode) -> Result<Vec<Section>, StructuralError> {
    let ContentNode::Document { children } = tree else {
        return Err(StructuralError::new(
            &[],
            format!("cannot extract sections from a {} node", tree.kind_name()),
        ));
    };

    let mut sections: Vec<Section> = Vec::new();
    let mut open: Vec<(u8, String)> = Vec::new();

    for (index, node) in children.iter().enumerate() {
        let ContentNode::Heading { level, .. } = node else {
            continue;
        };

        while let Some((open_level, _)) = open.last() {
            if *open_level >= *level {
                open.pop();
            } else {
                break;
            }
        }
        open.push((*level, node.text_content().trim().to_string()));

        if let Some(previous) = sections.last_mut() {
            previous.end_node_index = index - 1;
        }

        let heading_path: Vec<String> = open.iter().map(|(_, text)| text.clone()).collect();
        let breadcrumb = heading_path.join(BREADCRUMB_SEPARATOR);
        sections.push(Section {
            heading_levels: open.iter().map(|(level, _)| *level).collect(),
            breadcrumb_hash: sha256_hex(breadcrumb.as_bytes()),
            heading_path,
            breadcrumb,
            start_node_index: index,
            end_node_index: index,
        });
    }

    if let Some(last) = sections.last_mut() {
        last.end_node_index = children.len() - 1;
    }

    debug!(sections = sections.len(), nodes = children.len(), "extracted sections");
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(level: u8, text: &str) -> ContentNode {
        ContentNode::heading(level, text)
    }

    #[test]
    fn builds_breadcrumbs_from_the_heading_stack() {
        let doc = ContentNode::doc(vec![
            node(1, "Root"),
            ContentNode::paragraph("intro"),
            node(2, "Child"),
            node(3, "Grandchild"),
            ContentNode::paragraph("deep"),
            node(2, "Sibling"),
            ContentNode::paragraph("tail"),
        ]);
        let sections = extract_sections(&doc).expect("sections should extract");

        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].breadcrumb, "Root");
        assert_eq!((sections[0].start_node_index, sections[0].end_node_index), (0, 1));

        assert_eq!(sections[1].breadcrumb, "Root > Child");
        assert_eq!((sections[1].start_node_index, sections[1].end_node_index), (2, 2));

        assert_eq!(sections[2].breadcrumb, "Root > Child > Grandchild");
        assert_eq!(sections[2].heading_levels, vec![1, 2, 3]);
        assert_eq!((sections[2].start_node_index, sections[2].end_node_index), (3, 4));

        assert_eq!(sections[3].breadcrumb, "Root > Sibling");
        assert_eq!(sections[3].heading(), "Sibling");
        assert_eq!(sections[3].level(), 2);
        assert_eq!((sections[3].start_node_index, sections[3].end_node_index), (5, 6));
    }

    #[test]
    fn same_level_siblings_close_and_reopen() {
        let doc = ContentNode::doc(vec![node(2, "A"), node(2, "B"), node(2, "C")]);
        let sections = extract_sections(&doc).unwrap();
        let crumbs: Vec<_> = sections.iter().map(|section| section.breadcrumb.as_str()).collect();
        assert_eq!(crumbs, vec!["A", "B", "C"]);
        assert!(sections.iter().all(|section| section.body_len() == 0));
    }

    #[test]
    fn shallower_heading_pops_deeper_ones() {
        let doc = ContentNode::doc(vec![node(3, "Deep"), node(1, "Top"), node(2, "Under")]);
        let sections = extract_sections(&doc).unwrap();
        assert_eq!(sections[1].heading_path, vec!["Top"]);
        assert_eq!(sections[2].heading_path, vec!["Top", "Under"]);
    }

    #[test]
    fn no_headings_yields_no_sections() {
        let doc = ContentNode::doc(vec![ContentNode::paragraph("just text")]);
        assert!(extract_sections(&doc).unwrap().is_empty());
        assert!(extract_sections(&ContentNode::doc(vec![])).unwrap().is_empty());
    }

    #[test]
    fn nested_headings_do_not_open_sections() {
        let doc = ContentNode::doc(vec![
            node(1, "Top"),
            ContentNode::Blockquote { children: vec![node(2, "Quoted")] },
            ContentNode::BulletList {
                children: vec![ContentNode::ListItem { children: vec![node(3, "Listed")] }],
            },
            node(2, "Next"),
        ]);
        let sections = extract_sections(&doc).unwrap();

        let breadcrumbs: Vec<_> = sections.iter().map(|section| section.breadcrumb.as_str()).collect();
        assert_eq!(breadcrumbs, ["Top", "Top > Next"]);
        assert_eq!((sections[0].start_node_index, sections[0].end_node_index), (0, 2));
        let body = crate::content::text::serialize_nodes(&doc.children()[..=2]);
        assert!(body.contains("Quoted\nListed\n"), "{body}");
    }

    #[test]
    fn breadcrumb_hash_is_stable_and_position_sensitive() {
        let first = ContentNode::doc(vec![node(1, "A"), node(2, "B")]);
        let second = ContentNode::doc(vec![node(1, "A"), ContentNode::paragraph("x"), node(2, "B")]);
        let a = extract_sections(&first).unwrap();
        let b = extract_sections(&second).unwrap();
        assert_eq!(a[1].breadcrumb_hash, b[1].breadcrumb_hash);
        assert_eq!(a[1].breadcrumb_hash, sha256_hex(b"A > B"));
        assert_ne!(a[0].breadcrumb_hash, a[1].breadcrumb_hash);
    }

    #[test]
    fn non_document_root_is_structural_error() {
        let error = extract_sections(&ContentNode::paragraph("x")).unwrap_err();
        assert!(error.reason.contains("paragraph"));
    }
}
