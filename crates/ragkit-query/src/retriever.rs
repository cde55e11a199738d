use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use ragkit_core::types::{NodeId, NodeWithScore};
use ragkit_index::{DocStore, VectorStoreIndex};

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>>;
}

/// Plain top-k similarity retrieval over an index.
pub struct VectorIndexRetriever {
    index: Arc<VectorStoreIndex>,
    similarity_top_k: usize,
}

impl VectorIndexRetriever {
    pub fn new(index: Arc<VectorStoreIndex>, similarity_top_k: usize) -> Self {
        Self { index, similarity_top_k }
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let hits = self.index.similarity_search(query, self.similarity_top_k).await?;
        debug!(k = self.similarity_top_k, hits = hits.len(), "vector retrieval");
        Ok(hits)
    }
}

/// Retrieves leaves, then repeatedly swaps groups of siblings for their
/// parent when more than `simple_ratio_thresh` of the parent's children were
/// retrieved. The parent takes the mean score of the children it replaces.
pub struct AutoMergingRetriever {
    base: Arc<dyn Retriever>,
    index: Arc<VectorStoreIndex>,
    simple_ratio_thresh: f32,
    verbose: bool,
}

impl AutoMergingRetriever {
    pub const DEFAULT_RATIO_THRESH: f32 = 0.5;

    pub fn new(base: Arc<dyn Retriever>, index: Arc<VectorStoreIndex>, verbose: bool) -> Self {
        Self { base, index, simple_ratio_thresh: Self::DEFAULT_RATIO_THRESH, verbose }
    }

    pub fn with_ratio_thresh(mut self, thresh: f32) -> Self {
        self.simple_ratio_thresh = thresh;
        self
    }

    fn try_merging(&self, nodes: Vec<NodeWithScore>) -> Result<(Vec<NodeWithScore>, bool)> {
        let docstore = self.index.docstore();
        let (nodes, filled) = fill_in_nodes(docstore, nodes);
        let (nodes, merged) = self.merge_into_parents(docstore, nodes)?;
        Ok((nodes, filled || merged))
    }

    fn merge_into_parents(&self, docstore: &DocStore, nodes: Vec<NodeWithScore>) -> Result<(Vec<NodeWithScore>, bool)> {
        let mut parent_order: Vec<NodeId> = Vec::new();
        let mut retrieved_children: HashMap<NodeId, Vec<&NodeWithScore>> = HashMap::new();
        for n in &nodes {
            if let Some(pid) = n.node.parent_id() {
                let entry = retrieved_children.entry(pid.to_string()).or_default();
                if entry.is_empty() {
                    parent_order.push(pid.to_string());
                }
                entry.push(n);
            }
        }

        let mut to_delete: HashSet<NodeId> = HashSet::new();
        let mut to_add: Vec<NodeWithScore> = Vec::new();
        for pid in parent_order {
            let parent = docstore.get_node(&pid)?;
            let children = &retrieved_children[&pid];
            let total = parent.relationships.children.len().max(1);
            let ratio = children.len() as f32 / total as f32;
            if ratio > self.simple_ratio_thresh {
                to_delete.extend(children.iter().map(|c| c.node.id.clone()));
                let score = children.iter().map(|c| c.score).sum::<f32>() / children.len() as f32;
                if self.verbose {
                    info!(children = children.len(), of = total, parent = %pid, score, "merging nodes into parent node");
                }
                to_add.push(NodeWithScore::new(parent.clone(), score));
            }
        }

        let changed = !to_delete.is_empty();
        let mut out: Vec<NodeWithScore> = nodes.into_iter().filter(|n| !to_delete.contains(&n.node.id)).collect();
        for parent in to_add {
            if !out.iter().any(|n| n.node.id == parent.node.id) {
                out.push(parent);
            }
        }
        Ok((out, changed))
    }
}

/// Where two consecutive results sit one node apart, insert the node between
/// them with the mean of their scores.
fn fill_in_nodes(docstore: &DocStore, nodes: Vec<NodeWithScore>) -> (Vec<NodeWithScore>, bool) {
    let present: HashSet<NodeId> = nodes.iter().map(|n| n.node.id.clone()).collect();
    let mut inserted: HashSet<NodeId> = HashSet::new();
    let mut out = Vec::with_capacity(nodes.len());
    for (i, cur) in nodes.iter().enumerate() {
        out.push(cur.clone());
        let Some(next) = nodes.get(i + 1) else { continue };
        let (Some(between), Some(prev_of_next)) = (&cur.node.relationships.next, &next.node.relationships.previous) else {
            continue;
        };
        if between != prev_of_next || present.contains(between) || inserted.contains(between) {
            continue;
        }
        if let Some(node) = docstore.get(between) {
            inserted.insert(between.clone());
            out.push(NodeWithScore::new(node.clone(), (cur.score + next.score) / 2.0));
        }
    }
    let changed = !inserted.is_empty();
    (out, changed)
}

#[async_trait]
impl Retriever for AutoMergingRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let initial = self.base.retrieve(query).await?;
        let (mut nodes, mut changed) = self.try_merging(initial)?;
        while changed {
            (nodes, changed) = self.try_merging(nodes)?;
        }
        nodes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(nodes)
    }
}
