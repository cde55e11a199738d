use super::{document_scopes, NodeParser, TextSplitter};
use crate::config::validate_chunk_sizes;
use crate::types::{node_id, Document, Node, Relationships};

/// Splits each document into a chunk tree: level 0 uses `chunk_sizes[0]`,
/// and every chunk at level `i` is split again with `chunk_sizes[i + 1]`.
///
/// Output order is level by level within each document, coarsest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalNodeParser {
    chunk_sizes: Vec<usize>,
    chunk_overlap: usize,
}

impl Default for HierarchicalNodeParser {
    fn default() -> Self {
        Self { chunk_sizes: Self::DEFAULT_CHUNK_SIZES.to_vec(), chunk_overlap: Self::DEFAULT_CHUNK_OVERLAP }
    }
}

impl HierarchicalNodeParser {
    pub const DEFAULT_CHUNK_SIZES: [usize; 3] = [2048, 512, 128];
    pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

    pub fn from_defaults(chunk_sizes: Option<Vec<usize>>) -> crate::error::Result<Self> {
        Self::new(chunk_sizes.unwrap_or_else(|| Self::DEFAULT_CHUNK_SIZES.to_vec()), Self::DEFAULT_CHUNK_OVERLAP)
    }

    pub fn new(chunk_sizes: Vec<usize>, chunk_overlap: usize) -> crate::error::Result<Self> {
        validate_chunk_sizes(&chunk_sizes)?;
        Ok(Self { chunk_sizes, chunk_overlap })
    }

    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunk_sizes
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn nodes_for(&self, doc: &Document, scope: &str) -> Vec<Node> {
        let mut all = Vec::new();
        let roots = TextSplitter::new(self.chunk_sizes[0], self.chunk_overlap).split(&doc.text);
        let mut level = self.chunk_group(doc, scope, None, roots);
        for &size in &self.chunk_sizes[1..] {
            let splitter = TextSplitter::new(size, self.chunk_overlap);
            let mut next_level = Vec::new();
            for parent in level.iter_mut() {
                let children = self.chunk_group(doc, &parent.id, Some(&parent.id), splitter.split(&parent.text));
                parent.relationships.children = children.iter().map(|c| c.id.clone()).collect();
                next_level.extend(children);
            }
            all.append(&mut level);
            level = next_level;
        }
        all.append(&mut level);
        all
    }

    /// Nodes for the pieces of one split, linked to each other in order.
    fn chunk_group(&self, doc: &Document, scope: &str, parent: Option<&str>, pieces: Vec<String>) -> Vec<Node> {
        let ids: Vec<String> = (0..pieces.len()).map(|i| node_id(scope, "hierarchical", &i.to_string())).collect();
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| Node {
                id: ids[i].clone(),
                text,
                metadata: doc.metadata.clone(),
                relationships: Relationships {
                    source: Some(doc.id.clone()),
                    parent: parent.map(str::to_string),
                    children: Vec::new(),
                    previous: i.checked_sub(1).map(|p| ids[p].clone()),
                    next: ids.get(i + 1).cloned(),
                },
            })
            .collect()
    }
}

impl NodeParser for HierarchicalNodeParser {
    fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node> {
        let scopes = document_scopes(documents);
        documents.iter().zip(&scopes).flat_map(|(d, scope)| self.nodes_for(d, scope)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_parser::{estimate_tokens, get_leaf_nodes, get_root_nodes};
    use std::collections::HashMap;

    fn long_document() -> Document {
        // ~3600 words, comfortably above 2048 estimated tokens
        let text = (0..400)
            .map(|i| format!("Paragraph {i} talks about fire, shelter and water in detail."))
            .collect::<Vec<_>>()
            .join(" ");
        Document::new("survival.txt", text)
    }

    #[test]
    fn rejects_bad_chunk_sizes() {
        assert!(HierarchicalNodeParser::from_defaults(Some(vec![])).is_err());
        assert!(HierarchicalNodeParser::from_defaults(Some(vec![128, 512])).is_err());
    }

    #[test]
    fn leaves_have_no_children_and_every_ancestor_is_present() {
        let doc = long_document();
        assert!(estimate_tokens(&doc.text) > 2048);
        let parser = HierarchicalNodeParser::from_defaults(None).unwrap();
        let nodes = parser.get_nodes_from_documents(&[doc]);
        let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let leaves = get_leaf_nodes(&nodes);
        assert!(!leaves.is_empty());
        assert!(get_root_nodes(&nodes).len() >= 2, "document should span several 2048-token roots");
        for leaf in &leaves {
            assert!(leaf.relationships.children.is_empty());
            assert!(estimate_tokens(&leaf.text) <= 128);
            let mut depth = 0;
            let mut cur = *by_id.get(leaf.id.as_str()).unwrap();
            while let Some(pid) = cur.parent_id() {
                let parent = *by_id.get(pid).expect("ancestor missing");
                assert!(parent.relationships.children.contains(&cur.id));
                cur = parent;
                depth += 1;
            }
            assert_eq!(depth, 2, "leaf should sit two levels below its root");
        }
    }

    #[test]
    fn children_text_comes_from_parent() {
        let parser = HierarchicalNodeParser::new(vec![64, 16], 0).unwrap();
        let doc = Document::new("d", "One two three four five. Six seven eight nine ten. Eleven twelve. Thirteen fourteen fifteen.");
        let nodes = parser.get_nodes_from_documents(&[doc]);
        let roots = get_root_nodes(&nodes);
        assert_eq!(roots.len(), 1);
        for child_id in &roots[0].relationships.children {
            let child = nodes.iter().find(|n| &n.id == child_id).unwrap();
            assert!(roots[0].text.contains(&child.text));
        }
    }

    #[test]
    fn documents_sharing_an_id_get_distinct_nodes() {
        let parser = HierarchicalNodeParser::from_defaults(None).unwrap();
        let docs = [Document::new("page", "Alpha text about wells."), Document::new("page", "Beta text about roofs.")];
        let nodes = parser.get_nodes_from_documents(&docs);
        let ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), nodes.len());
        let leaves = get_leaf_nodes(&nodes);
        assert_eq!(leaves.len(), 2);
        assert_ne!(leaves[0].id, leaves[1].id);
        assert!(leaves.iter().all(|l| l.relationships.source.as_deref() == Some("page")));
    }

    #[test]
    fn ids_are_deterministic_across_parses() {
        let parser = HierarchicalNodeParser::from_defaults(Some(vec![256, 64])).unwrap();
        let a = parser.get_nodes_from_documents(&[long_document()]);
        let b = parser.get_nodes_from_documents(&[long_document()]);
        assert_eq!(a.iter().map(|n| &n.id).collect::<Vec<_>>(), b.iter().map(|n| &n.id).collect::<Vec<_>>());
    }
}
