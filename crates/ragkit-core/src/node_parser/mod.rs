//! Document → node parsers.
//!
//! - [`SentenceWindowNodeParser`]: one node per sentence, with the
//!   surrounding sentences stored under the `window` metadata key.
//! - [`HierarchicalNodeParser`]: a coarse-to-fine chunk tree with
//!   parent/child links; only leaves get embedded.

mod hierarchical;
mod sentence;
mod sentence_window;

pub use hierarchical::HierarchicalNodeParser;
pub use sentence::{split_sentences, TextSplitter};
pub use sentence_window::{SentenceWindowNodeParser, ORIGINAL_TEXT_METADATA_KEY, WINDOW_METADATA_KEY};

use std::collections::HashMap;

use crate::types::{Document, Node};

pub trait NodeParser {
    fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node>;
}

/// Node-id scope per document: the document id, suffixed with `#k` for the
/// k-th repeat of an id already seen in the same batch.
pub(crate) fn document_scopes(documents: &[Document]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    documents
        .iter()
        .map(|d| {
            let n = seen.entry(d.id.as_str()).or_insert(0);
            let scope = if *n == 0 { d.id.clone() } else { format!("{}#{}", d.id, n) };
            *n += 1;
            scope
        })
        .collect()
}

/// Nodes without children.
pub fn get_leaf_nodes(nodes: &[Node]) -> Vec<Node> {
    nodes.iter().filter(|n| n.is_leaf()).cloned().collect()
}

/// Nodes without a parent (the coarsest chunks).
pub fn get_root_nodes(nodes: &[Node]) -> Vec<Node> {
    nodes.iter().filter(|n| n.parent_id().is_none()).cloned().collect()
}

/// Rough token count: whitespace words at 0.75 words per token.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75).ceil() as usize
}
