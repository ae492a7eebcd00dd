// Wire mapping between the editor's JSON document format and `ContentNode`.
//
// Nodes look like `{"type": "paragraph", "attrs": {...}, "content": [...]}`,
// text runs like `{"type": "text", "text": "...", "marks": [...]}`. Node
// kinds we do not interpret are kept verbatim in `ContentNode::Unknown`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::{ContentNode, Mark, MarkSet};
use crate::error::StructuralError;

impl ContentNode {
    /// Parse a wire-format node (usually the `doc` root).
    pub fn from_json(value: &Value) -> Result<Self, StructuralError> {
        node_from_json(value, &mut Vec::new())
    }

    /// Render back to the wire format.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Document { children } => container_json("doc", None, children),
            Self::Heading { level, children } => {
                container_json("heading", Some(json!({ "level": level })), children)
            }
            Self::Paragraph { children } => container_json("paragraph", None, children),
            Self::BulletList { children } => container_json("bulletList", None, children),
            Self::OrderedList { children } => container_json("orderedList", None, children),
            Self::ListItem { children } => container_json("listItem", None, children),
            Self::Blockquote { children } => container_json("blockquote", None, children),
            Self::CodeBlock { language, text } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("codeBlock"));
                object.insert("attrs".into(), json!({ "language": language }));
                if !text.is_empty() {
                    object.insert("content".into(), json!([{ "type": "text", "text": text }]));
                }
                Value::Object(object)
            }
            Self::Text { text, marks } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("text"));
                object.insert("text".into(), json!(text));
                if !marks.is_empty() {
                    object.insert(
                        "marks".into(),
                        Value::Array(marks.iter().map(mark_to_json).collect()),
                    );
                }
                Value::Object(object)
            }
            Self::Unknown { raw } => raw.clone(),
        }
    }
}

impl Serialize for ContentNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}

fn container_json(kind: &str, attrs: Option<Value>, children: &[ContentNode]) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), json!(kind));
    if let Some(attrs) = attrs {
        object.insert("attrs".into(), attrs);
    }
    if !children.is_empty() {
        object.insert(
            "content".into(),
            Value::Array(children.iter().map(ContentNode::to_json).collect()),
        );
    }
    Value::Object(object)
}

fn node_from_json(value: &Value, path: &mut Vec<usize>) -> Result<ContentNode, StructuralError> {
    let Some(object) = value.as_object() else {
        return Err(StructuralError::new(path, "node must be a JSON object"));
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return Err(StructuralError::new(path, "node is missing a string `type`"));
    };

    let node = match kind {
        "doc" => ContentNode::Document { children: children_from_json(object, path)? },
        "heading" => {
            let level = attr(object, "level")
                .and_then(Value::as_u64)
                .and_then(|level| u8::try_from(level).ok())
                .ok_or_else(|| {
                    StructuralError::new(path, "heading is missing an integer `attrs.level`")
                })?;
            ContentNode::Heading { level, children: children_from_json(object, path)? }
        }
        "paragraph" => ContentNode::Paragraph { children: children_from_json(object, path)? },
        "bulletList" => ContentNode::BulletList { children: children_from_json(object, path)? },
        "orderedList" => ContentNode::OrderedList { children: children_from_json(object, path)? },
        "listItem" => ContentNode::ListItem { children: children_from_json(object, path)? },
        "blockquote" => ContentNode::Blockquote { children: children_from_json(object, path)? },
        "codeBlock" => {
            let language = attr(object, "language").and_then(Value::as_str).map(str::to_string);
            let mut text = String::new();
            for child in children_from_json(object, path)? {
                match child {
                    ContentNode::Text { text: run, .. } => text.push_str(&run),
                    other => {
                        return Err(StructuralError::new(
                            path,
                            format!("codeBlock may only contain text, found {}", other.kind_name()),
                        ));
                    }
                }
            }
            ContentNode::CodeBlock { language, text }
        }
        "text" => {
            let text = object.get("text").and_then(Value::as_str).ok_or_else(|| {
                StructuralError::new(path, "text node is missing a string `text`")
            })?;
            ContentNode::Text { text: text.to_string(), marks: marks_from_json(object, path)? }
        }
        _ => ContentNode::Unknown { raw: value.clone() },
    };
    Ok(node)
}

fn attr<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get("attrs").and_then(|attrs| attrs.get(name))
}

fn children_from_json(
    object: &Map<String, Value>,
    path: &mut Vec<usize>,
) -> Result<Vec<ContentNode>, StructuralError> {
    match object.get("content") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut children = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(index);
                children.push(node_from_json(item, path)?);
                path.pop();
            }
            Ok(children)
        }
        Some(_) => Err(StructuralError::new(path, "`content` must be an array")),
    }
}

fn marks_from_json(
    object: &Map<String, Value>,
    path: &[usize],
) -> Result<MarkSet, StructuralError> {
    match object.get("marks") {
        None | Some(Value::Null) => Ok(MarkSet::new()),
        Some(Value::Array(items)) => Ok(items.iter().map(mark_from_json).collect()),
        Some(_) => Err(StructuralError::new(path, "`marks` must be an array")),
    }
}

fn mark_from_json(value: &Value) -> Mark {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "bold" => Mark::Bold,
        "italic" => Mark::Italic,
        "strike" => Mark::Strike,
        "code" => Mark::Code,
        "link" => match value.get("attrs").and_then(|attrs| attrs.get("href")).and_then(Value::as_str)
        {
            Some(href) => Mark::Link { href: href.to_string() },
            None => Mark::Other(value.to_string()),
        },
        _ => Mark::Other(value.to_string()),
    }
}

fn mark_to_json(mark: &Mark) -> Value {
    match mark {
        Mark::Bold => json!({ "type": "bold" }),
        Mark::Italic => json!({ "type": "italic" }),
        Mark::Strike => json!({ "type": "strike" }),
        Mark::Code => json!({ "type": "code" }),
        Mark::Link { href } => json!({ "type": "link", "attrs": { "href": href } }),
        Mark::Other(raw) => serde_json::from_str(raw).unwrap_or_else(|_| json!({ "type": raw })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_doc() -> Value {
        json!({
            "type": "doc",
            "content": [
                { "type": "heading", "attrs": { "level": 2 }, "content": [
                    { "type": "text", "text": "Launch" }
                ]},
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "Read " },
                    { "type": "text", "text": "the docs", "marks": [
                        { "type": "link", "attrs": { "href": "https://example.com" } },
                        { "type": "underline" }
                    ]}
                ]},
                { "type": "codeBlock", "attrs": { "language": "sh" }, "content": [
                    { "type": "text", "text": "make release" }
                ]},
                { "type": "table", "content": [{ "type": "tableRow" }] }
            ]
        })
    }

    #[test]
    fn parses_interpreted_and_unknown_nodes() {
        let doc = ContentNode::from_json(&wire_doc()).expect("wire doc should parse");
        let children = doc.children();
        assert_eq!(children.len(), 4);
        assert!(matches!(children[0], ContentNode::Heading { level: 2, .. }));
        assert_eq!(children[2], ContentNode::code_block(Some("sh"), "make release"));
        assert_eq!(children[3].kind_name(), "table");

        let ContentNode::Text { marks, .. } = &children[1].children()[1] else {
            panic!("expected a text run");
        };
        assert!(marks.contains(&Mark::Link { href: "https://example.com".into() }));
        assert!(marks.iter().any(|mark| matches!(mark, Mark::Other(raw) if raw.contains("underline"))));
    }

    #[test]
    fn round_trips_through_wire_format() {
        let doc = ContentNode::from_json(&wire_doc()).unwrap();
        let reparsed = ContentNode::from_json(&doc.to_json()).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn unknown_nodes_are_preserved_verbatim() {
        let doc = ContentNode::from_json(&wire_doc()).unwrap();
        let rendered = doc.to_json();
        assert_eq!(rendered["content"][3], wire_doc()["content"][3]);
    }

    #[test]
    fn serde_impls_use_wire_format() {
        let doc: ContentNode = serde_json::from_value(wire_doc()).expect("deserialize doc");
        let value = serde_json::to_value(&doc).expect("serialize doc");
        assert_eq!(value["content"][0]["attrs"]["level"], json!(2));
    }

    #[test]
    fn missing_heading_level_is_structural_error() {
        let value = json!({ "type": "doc", "content": [
            { "type": "paragraph" },
            { "type": "heading", "content": [{ "type": "text", "text": "x" }] }
        ]});
        let error = ContentNode::from_json(&value).unwrap_err();
        assert_eq!(error.path.0, vec![1]);
        assert!(error.reason.contains("attrs.level"));
    }

    #[test]
    fn text_without_text_field_is_structural_error() {
        let value = json!({ "type": "paragraph", "content": [{ "type": "text" }] });
        let error = ContentNode::from_json(&value).unwrap_err();
        assert_eq!(error.path.0, vec![0]);
    }

    #[test]
    fn node_without_type_is_structural_error() {
        let error = ContentNode::from_json(&json!({ "content": [] })).unwrap_err();
        assert!(error.reason.contains("type"));
    }
}
