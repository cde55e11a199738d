use anyhow::{anyhow, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use ragkit_core::traits::{Embedder, LanguageModel};
use ragkit_core::types::{hash_hex, Node, NodeWithScore};

use crate::docstore::DocStore;
use crate::storage::{ensure_complete, IndexKind, IndexStruct, StorageContext, INDEX_STORE_FILE};

const EMBED_BATCH_SIZE: usize = 64;

/// Vector index over a set of nodes, bound to the embedder that produced its
/// vectors and the language model used when it is queried.
pub struct VectorStoreIndex {
    storage: StorageContext,
    index_struct: IndexStruct,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
}

impl VectorStoreIndex {
    /// Embed `nodes` into the vector store of `storage`. Nodes are also
    /// registered in the docstore if the caller has not done so already.
    pub async fn build(
        nodes: &[Node],
        mut storage: StorageContext,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        kind: IndexKind,
        fingerprint: String,
    ) -> Result<Self> {
        if embedder.dim() != storage.vector_store.dim() {
            return Err(anyhow!("embedder dim {} does not match vector store dim {}", embedder.dim(), storage.vector_store.dim()));
        }
        info!(nodes = nodes.len(), model = embedder.model_id(), "embedding nodes");
        let pb = ProgressBar::new(nodes.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} nodes ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        for batch in nodes.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|n| n.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts)?;
            let ids: Vec<String> = batch.iter().map(|n| n.id.clone()).collect();
            storage.vector_store.add(&ids, &vectors).await?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");

        let unregistered: Vec<Node> = nodes.iter().filter(|n| !storage.docstore.contains(&n.id)).cloned().collect();
        storage.docstore.add_documents(unregistered);
        let created_at = Utc::now();
        let index_struct = IndexStruct {
            index_id: hash_hex(&format!("{fingerprint}:{}", created_at.timestamp_nanos_opt().unwrap_or_default()))[..16].to_string(),
            kind,
            embed_model: embedder.model_id().to_string(),
            dim: embedder.dim(),
            node_ids: nodes.iter().map(|n| n.id.clone()).collect(),
            fingerprint,
            created_at,
        };
        Ok(Self { storage, index_struct, embedder, llm })
    }

    /// Write vector store and docstore under `dir`, then `index_store.json`.
    pub async fn persist(self, dir: &Path) -> Result<Self> {
        let storage = self.storage.persist(dir).await?;
        self.index_struct.persist(&dir.join(INDEX_STORE_FILE))?;
        info!(dir = %dir.display(), vectors = self.index_struct.node_ids.len(), nodes = storage.docstore.len(), "index persisted");
        Ok(Self { storage, ..self })
    }

    /// Load a persisted index, binding `embedder` for queries and `llm` for
    /// synthesis.
    pub async fn load_from_storage(dir: &Path, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        ensure_complete(dir)?;
        let index_struct = IndexStruct::load(&dir.join(INDEX_STORE_FILE))?;
        if index_struct.dim != embedder.dim() {
            return Err(anyhow!(
                "index at {} was built with {} (dim {}), cannot query with {} (dim {})",
                dir.display(),
                index_struct.embed_model,
                index_struct.dim,
                embedder.model_id(),
                embedder.dim()
            ));
        }
        if index_struct.embed_model != embedder.model_id() {
            warn!(persisted = %index_struct.embed_model, bound = embedder.model_id(), "embedding model differs from the one used at build time");
        }
        let storage = StorageContext::from_persist_dir(dir, index_struct.dim).await?;
        info!(dir = %dir.display(), nodes = storage.docstore.len(), "index loaded");
        Ok(Self { storage, index_struct, embedder, llm })
    }

    /// Top-`k` embedded nodes for `query`, highest score first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<NodeWithScore>> {
        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;
        let hits = self.storage.vector_store.query(&query_vec, k).await?;
        let mut out = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            match self.storage.docstore.get(&id) {
                Some(node) => out.push(NodeWithScore::new(node.clone(), score)),
                None => warn!(%id, "vector hit missing from docstore"),
            }
        }
        Ok(out)
    }

    pub fn docstore(&self) -> &DocStore {
        &self.storage.docstore
    }

    pub fn storage_context(&self) -> &StorageContext {
        &self.storage
    }

    pub fn index_struct(&self) -> &IndexStruct {
        &self.index_struct
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }
}
