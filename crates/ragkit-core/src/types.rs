//! Domain types shared by the parsers, index builders and query engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = String;
pub type Meta = HashMap<String, String>;

/// Raw input text plus metadata, as produced by the loader.
///
/// - `id`: stable document identity (relative path or caller-supplied id)
/// - `text`: full text payload
/// - `metadata`: copied onto every node parsed from the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Meta::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Concatenate several documents into one, separated by blank lines.
    ///
    /// The merged document keeps the metadata of the first input and an id
    /// derived from every input id.
    pub fn merged(docs: &[Document]) -> Document {
        let text = docs.iter().map(|d| d.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let id = match docs {
            [] => "merged:empty".to_string(),
            [only] => only.id.clone(),
            _ => format!("merged:{}", hash_hex(&docs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join("\u{1f}"))),
        };
        let metadata = docs.first().map(|d| d.metadata.clone()).unwrap_or_default();
        Document { id, text, metadata }
    }
}

/// Links from a node to its neighbours in the parse tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    /// Id of the document this node was parsed from.
    pub source: Option<String>,
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    pub previous: Option<NodeId>,
    pub next: Option<NodeId>,
}

/// A chunk of a document; the unit that is stored, embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub relationships: Relationships,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.relationships.children.is_empty()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.relationships.parent.as_deref()
    }
}

/// A retrieved node and its score. Higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: f32,
}

impl NodeWithScore {
    pub fn new(node: Node, score: f32) -> Self {
        Self { node, score }
    }
}

/// Deterministic node id: the same document, parser and position always
/// produce the same id.
pub fn node_id(doc_id: &str, tag: &str, position: &str) -> NodeId {
    hash_hex(&format!("{doc_id}\u{1f}{tag}\u{1f}{position}"))[..32].to_string()
}

pub fn hash_hex(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_joins_with_blank_lines() {
        let a = Document::new("a", "first").with_metadata("file_name", "a.txt");
        let b = Document::new("b", "second");
        let m = Document::merged(&[a.clone(), b]);
        assert_eq!(m.text, "first\n\nsecond");
        assert_eq!(m.metadata.get("file_name").map(String::as_str), Some("a.txt"));
        assert_eq!(Document::merged(&[a.clone()]).id, "a");
    }

    #[test]
    fn node_ids_are_stable() {
        assert_eq!(node_id("doc", "sw", "3"), node_id("doc", "sw", "3"));
        assert_ne!(node_id("doc", "sw", "3"), node_id("doc", "sw", "4"));
        assert_eq!(node_id("doc", "sw", "3").len(), 32);
    }
}
