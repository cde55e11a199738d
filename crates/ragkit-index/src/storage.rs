//! On-disk layout of a persisted index:
//!
//! ```text
//! <save_dir>/
//!   vector_store/      LanceDB table `vectors`
//!   docstore.json      every node
//!   index_store.json   IndexStruct, written last
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ragkit_core::error::Error;
use ragkit_core::types::NodeId;

use crate::docstore::DocStore;
use crate::vector_store::LanceVectorStore;

pub const VECTOR_STORE_DIR: &str = "vector_store";
pub const DOCSTORE_FILE: &str = "docstore.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexKind {
    SentenceWindow { window_size: usize },
    AutoMerging { chunk_sizes: Vec<usize>, chunk_overlap: usize },
}

/// Index metadata persisted in `index_store.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStruct {
    pub index_id: String,
    pub kind: IndexKind,
    pub embed_model: String,
    pub dim: usize,
    /// Nodes that have a row in the vector store.
    pub node_ids: Vec<NodeId>,
    /// blake3 over document ids, texts and parser configuration.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl IndexStruct {
    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Docstore plus vector store of one index.
pub struct StorageContext {
    pub docstore: DocStore,
    pub vector_store: LanceVectorStore,
}

impl StorageContext {
    /// Empty docstore and a staged vector store of dimension `dim`.
    pub async fn from_defaults(dim: usize) -> Result<Self> {
        Ok(Self { docstore: DocStore::new(), vector_store: LanceVectorStore::create_staged(dim).await? })
    }

    /// Vector store and docstore into `dir`. `index_store.json` is the
    /// caller's to write once this returns.
    pub async fn persist(self, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let vector_store = self.vector_store.persist_to(&dir.join(VECTOR_STORE_DIR)).await?;
        self.docstore.persist(&dir.join(DOCSTORE_FILE))?;
        Ok(Self { docstore: self.docstore, vector_store })
    }

    pub async fn from_persist_dir(dir: &Path, dim: usize) -> Result<Self> {
        let docstore = DocStore::load(&dir.join(DOCSTORE_FILE))?;
        let vector_store = LanceVectorStore::open(&dir.join(VECTOR_STORE_DIR), dim).await?;
        Ok(Self { docstore, vector_store })
    }
}

/// Paths of required pieces missing under `dir`.
pub fn missing_pieces(dir: &Path) -> Vec<PathBuf> {
    [VECTOR_STORE_DIR, DOCSTORE_FILE, INDEX_STORE_FILE]
        .into_iter()
        .map(|p| dir.join(p))
        .filter(|p| !p.exists())
        .collect()
}

pub fn ensure_complete(dir: &Path) -> ragkit_core::error::Result<()> {
    let missing = missing_pieces(dir);
    if missing.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = missing
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    Err(Error::IncompleteIndex { path: dir.display().to_string(), missing: names.join(", ") })
}
