use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::debug;

use ragkit_core::traits::Reranker;
use ragkit_core::types::NodeWithScore;

/// Transforms the retrieved node list before synthesis.
pub trait NodePostprocessor: Send + Sync {
    fn postprocess(&self, nodes: Vec<NodeWithScore>, query: &str) -> Result<Vec<NodeWithScore>>;
}

/// Replaces each node's text with the value stored under
/// `target_metadata_key`; nodes without that key are left as they are.
pub struct MetadataReplacementPostProcessor {
    target_metadata_key: String,
}

impl MetadataReplacementPostProcessor {
    pub fn new(target_metadata_key: impl Into<String>) -> Self {
        Self { target_metadata_key: target_metadata_key.into() }
    }

    pub fn target_metadata_key(&self) -> &str {
        &self.target_metadata_key
    }
}

impl NodePostprocessor for MetadataReplacementPostProcessor {
    fn postprocess(&self, mut nodes: Vec<NodeWithScore>, _query: &str) -> Result<Vec<NodeWithScore>> {
        for n in &mut nodes {
            if let Some(replacement) = n.node.metadata.get(&self.target_metadata_key) {
                n.node.text = replacement.clone();
            }
        }
        Ok(nodes)
    }
}

/// Cross-encoder rerank: rescores every `(query, node text)` pair and keeps
/// the best `top_n`.
pub struct SentenceTransformerRerank {
    top_n: usize,
    reranker: Arc<dyn Reranker>,
}

impl SentenceTransformerRerank {
    pub fn new(top_n: usize, reranker: Arc<dyn Reranker>) -> Self {
        Self { top_n, reranker }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn model_id(&self) -> &str {
        self.reranker.model_id()
    }
}

impl NodePostprocessor for SentenceTransformerRerank {
    fn postprocess(&self, nodes: Vec<NodeWithScore>, query: &str) -> Result<Vec<NodeWithScore>> {
        if nodes.is_empty() {
            return Ok(nodes);
        }
        let texts: Vec<String> = nodes.iter().map(|n| n.node.text.clone()).collect();
        let scores = self.reranker.score(query, &texts)?;
        if scores.len() != nodes.len() {
            return Err(anyhow!("reranker returned {} scores for {} nodes", scores.len(), nodes.len()));
        }
        let mut rescored: Vec<NodeWithScore> =
            nodes.into_iter().zip(scores).map(|(n, s)| NodeWithScore::new(n.node, s)).collect();
        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        rescored.truncate(self.top_n);
        debug!(model = self.reranker.model_id(), kept = rescored.len(), "reranked");
        Ok(rescored)
    }
}
