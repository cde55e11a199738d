use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use ragkit_core::error::Error;
use ragkit_core::types::{Node, NodeId};

/// Every parsed node by id, embedded or not. Auto-merging resolves parents
/// through it, sentence-window retrieval reads node metadata from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocStore {
    nodes: BTreeMap<NodeId, Node>,
}

impl DocStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_documents(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node(&self, id: &str) -> ragkit_core::error::Result<&Node> {
        self.nodes.get(id).ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}
