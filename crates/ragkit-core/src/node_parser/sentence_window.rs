use super::{document_scopes, split_sentences, NodeParser};
use crate::types::{node_id, Document, Node, Relationships};

pub const WINDOW_METADATA_KEY: &str = "window";
pub const ORIGINAL_TEXT_METADATA_KEY: &str = "original_text";

/// One node per sentence. Each node carries the `window_size` sentences on
/// either side (clamped at the document edges) under `window_metadata_key`
/// and its own sentence under `original_text_metadata_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceWindowNodeParser {
    pub window_size: usize,
    pub window_metadata_key: String,
    pub original_text_metadata_key: String,
}

impl Default for SentenceWindowNodeParser {
    fn default() -> Self {
        Self::from_defaults(3)
    }
}

impl SentenceWindowNodeParser {
    pub fn from_defaults(window_size: usize) -> Self {
        Self {
            window_size,
            window_metadata_key: WINDOW_METADATA_KEY.to_string(),
            original_text_metadata_key: ORIGINAL_TEXT_METADATA_KEY.to_string(),
        }
    }

    fn nodes_for(&self, doc: &Document, scope: &str) -> Vec<Node> {
        let sentences = split_sentences(&doc.text);
        let ids: Vec<String> = (0..sentences.len()).map(|i| node_id(scope, "sentence_window", &i.to_string())).collect();
        sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let lo = i.saturating_sub(self.window_size);
                let hi = (i + self.window_size).min(sentences.len() - 1);
                let mut metadata = doc.metadata.clone();
                metadata.insert(self.window_metadata_key.clone(), sentences[lo..=hi].join(" "));
                metadata.insert(self.original_text_metadata_key.clone(), sentence.clone());
                Node {
                    id: ids[i].clone(),
                    text: sentence.clone(),
                    metadata,
                    relationships: Relationships {
                        source: Some(doc.id.clone()),
                        previous: i.checked_sub(1).map(|p| ids[p].clone()),
                        next: ids.get(i + 1).cloned(),
                        ..Relationships::default()
                    },
                }
            })
            .collect()
    }
}

impl NodeParser for SentenceWindowNodeParser {
    fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node> {
        let scopes = document_scopes(documents);
        documents.iter().zip(&scopes).flat_map(|(d, scope)| self.nodes_for(d, scope)).collect()
    }
}
