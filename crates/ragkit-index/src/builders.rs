//! Build-or-load entry points for the two index flavors.
//!
//! The save directory is the build/load key: when it exists the persisted
//! index is loaded and nothing is re-embedded, otherwise documents are parsed,
//! embedded and persisted there.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ragkit_core::config::Settings;
use ragkit_core::model::EmbedModel;
use ragkit_core::node_parser::{get_leaf_nodes, HierarchicalNodeParser, NodeParser, SentenceWindowNodeParser};
use ragkit_core::traits::{Embedder, LanguageModel};
use ragkit_core::types::Document;
use ragkit_embed::get_embedder;

use crate::index::VectorStoreIndex;
use crate::storage::{ensure_complete, IndexKind, IndexStruct, StorageContext, INDEX_STORE_FILE};

pub const DEFAULT_SENTENCE_WINDOW_DIR: &str = "sentence_index";
pub const DEFAULT_AUTOMERGING_DIR: &str = "merging_index";
pub const DEFAULT_MODELS_DIR: &str = "models";

/// What to do when a persisted index was built from different content or
/// parser settings than the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Log a warning and serve the persisted index.
    #[default]
    Serve,
    /// Remove the save directory and build again.
    Rebuild,
}

impl StalePolicy {
    pub fn from_flag(rebuild_on_stale: bool) -> Self {
        if rebuild_on_stale { Self::Rebuild } else { Self::Serve }
    }
}

/// blake3 over parser configuration, embed model and every document's id and text.
pub fn content_fingerprint(documents: &[Document], config: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config.as_bytes());
    for doc in documents {
        hasher.update(&[0x1e]);
        hasher.update(doc.id.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(doc.text.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Shared knobs of both builders.
#[derive(Clone)]
struct BuildTarget {
    embed_model: EmbedModel,
    embedder: Option<Arc<dyn Embedder>>,
    models_dir: PathBuf,
    save_dir: PathBuf,
    stale_policy: StalePolicy,
}

impl BuildTarget {
    fn new(save_dir: PathBuf) -> Self {
        Self {
            embed_model: EmbedModel::default(),
            embedder: None,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            save_dir,
            stale_policy: StalePolicy::default(),
        }
    }

    fn resolve_embedder(&self) -> Result<Arc<dyn Embedder>> {
        match &self.embedder {
            Some(e) => Ok(Arc::clone(e)),
            None => get_embedder(&self.embed_model, &self.models_dir, None),
        }
    }

    /// Loaded index when the save directory exists and is to be served.
    async fn try_load(
        &self,
        embedder: &Arc<dyn Embedder>,
        llm: &Arc<dyn LanguageModel>,
        fingerprint: &str,
    ) -> Result<Option<VectorStoreIndex>> {
        if !self.save_dir.exists() {
            return Ok(None);
        }
        // Without the marker the directory is not ours to remove.
        let marker = self.save_dir.join(INDEX_STORE_FILE);
        if !marker.exists() {
            ensure_complete(&self.save_dir)?;
        }
        let persisted = IndexStruct::load(&marker)?.fingerprint;
        if persisted != fingerprint {
            warn!(dir = %self.save_dir.display(), policy = ?self.stale_policy, "persisted index does not match current documents or settings");
            if self.stale_policy == StalePolicy::Rebuild {
                std::fs::remove_dir_all(&self.save_dir)?;
                return Ok(None);
            }
        }
        info!(dir = %self.save_dir.display(), "loading persisted index");
        let index = VectorStoreIndex::load_from_storage(&self.save_dir, Arc::clone(embedder), Arc::clone(llm)).await?;
        Ok(Some(index))
    }
}

/// Builds or loads a sentence-window index over one document.
#[derive(Clone)]
pub struct SentenceWindowIndexBuilder {
    target: BuildTarget,
    window_size: usize,
}

impl SentenceWindowIndexBuilder {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self { target: BuildTarget::new(save_dir.into()), window_size: 3 }
    }

    /// Builder configured from the `index`, `embedding` and `models` sections.
    pub fn from_settings(settings: &Settings, base: &Path) -> Self {
        let save_dir = ragkit_core::config::resolve_with_base(base, &settings.index.sentence_window_dir);
        let mut b = Self::new(save_dir)
            .embed_model(settings.embedding.model)
            .window_size(settings.index.window_size)
            .stale_policy(StalePolicy::from_flag(settings.index.rebuild_on_stale));
        b.target.models_dir = ragkit_core::config::resolve_with_base(base, &settings.models.dir);
        b
    }

    pub fn embed_model(mut self, model: EmbedModel) -> Self {
        self.target.embed_model = model;
        self
    }

    /// Use this embedder instead of loading `embed_model`.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.target.embedder = Some(embedder);
        self
    }

    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target.models_dir = dir.into();
        self
    }

    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn stale_policy(mut self, policy: StalePolicy) -> Self {
        self.target.stale_policy = policy;
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.target.save_dir
    }

    pub async fn build(&self, document: &Document, llm: Arc<dyn LanguageModel>) -> Result<VectorStoreIndex> {
        let embedder = self.target.resolve_embedder()?;
        let parser = SentenceWindowNodeParser::from_defaults(self.window_size);
        let documents = std::slice::from_ref(document);
        let fingerprint =
            content_fingerprint(documents, &format!("sentence_window:{}:{}", self.window_size, embedder.model_id()));
        if let Some(index) = self.target.try_load(&embedder, &llm, &fingerprint).await? {
            return Ok(index);
        }

        let nodes = parser.get_nodes_from_documents(documents);
        info!(document = %document.id, sentences = nodes.len(), window_size = self.window_size, "building sentence-window index");
        let storage = StorageContext::from_defaults(embedder.dim()).await?;
        let kind = IndexKind::SentenceWindow { window_size: self.window_size };
        let index = VectorStoreIndex::build(&nodes, storage, embedder, llm, kind, fingerprint).await?;
        index.persist(&self.target.save_dir).await
    }
}

/// Builds or loads an auto-merging index: every level of the hierarchy goes
/// into the docstore, only leaves are embedded.
#[derive(Clone)]
pub struct AutoMergingIndexBuilder {
    target: BuildTarget,
    parser: HierarchicalNodeParser,
}

impl AutoMergingIndexBuilder {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            target: BuildTarget::new(save_dir.into()),
            parser: HierarchicalNodeParser::default(),
        }
    }

    pub fn from_settings(settings: &Settings, base: &Path) -> Result<Self> {
        let save_dir = ragkit_core::config::resolve_with_base(base, &settings.index.automerging_dir);
        let mut b = Self::new(save_dir)
            .embed_model(settings.embedding.model)
            .chunking(settings.index.chunk_sizes.clone(), settings.index.chunk_overlap)?
            .stale_policy(StalePolicy::from_flag(settings.index.rebuild_on_stale));
        b.target.models_dir = ragkit_core::config::resolve_with_base(base, &settings.models.dir);
        Ok(b)
    }

    pub fn embed_model(mut self, model: EmbedModel) -> Self {
        self.target.embed_model = model;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.target.embedder = Some(embedder);
        self
    }

    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target.models_dir = dir.into();
        self
    }

    /// Chunk sizes coarsest first; rejected unless non-empty and strictly
    /// decreasing.
    pub fn chunk_sizes(self, chunk_sizes: Vec<usize>) -> Result<Self> {
        let overlap = self.parser.chunk_overlap();
        self.chunking(chunk_sizes, overlap)
    }

    pub fn chunking(mut self, chunk_sizes: Vec<usize>, chunk_overlap: usize) -> Result<Self> {
        self.parser = HierarchicalNodeParser::new(chunk_sizes, chunk_overlap)?;
        Ok(self)
    }

    pub fn stale_policy(mut self, policy: StalePolicy) -> Self {
        self.target.stale_policy = policy;
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.target.save_dir
    }

    pub async fn build(&self, documents: &[Document], llm: Arc<dyn LanguageModel>) -> Result<VectorStoreIndex> {
        let embedder = self.target.resolve_embedder()?;
        let config = format!(
            "automerging:{:?}:{}:{}",
            self.parser.chunk_sizes(),
            self.parser.chunk_overlap(),
            embedder.model_id()
        );
        let fingerprint = content_fingerprint(documents, &config);
        if let Some(index) = self.target.try_load(&embedder, &llm, &fingerprint).await? {
            return Ok(index);
        }

        let nodes = self.parser.get_nodes_from_documents(documents);
        let leaf_nodes = get_leaf_nodes(&nodes);
        info!(
            documents = documents.len(),
            nodes = nodes.len(),
            leaves = leaf_nodes.len(),
            chunk_sizes = ?self.parser.chunk_sizes(),
            "building auto-merging index"
        );
        let mut storage = StorageContext::from_defaults(embedder.dim()).await?;
        storage.docstore.add_documents(nodes);
        let kind = IndexKind::AutoMerging {
            chunk_sizes: self.parser.chunk_sizes().to_vec(),
            chunk_overlap: self.parser.chunk_overlap(),
        };
        let index = VectorStoreIndex::build(&leaf_nodes, storage, embedder, llm, kind, fingerprint).await?;
        index.persist(&self.target.save_dir).await
    }
}

/// Sentence-window index over `document` with window size 3, built into
/// `save_dir` on first use and loaded from it afterwards.
pub async fn build_sentence_window_index(
    document: &Document,
    llm: Arc<dyn LanguageModel>,
    embed_model: &EmbedModel,
    save_dir: impl AsRef<Path>,
) -> Result<VectorStoreIndex> {
    SentenceWindowIndexBuilder::new(save_dir.as_ref())
        .embed_model(*embed_model)
        .build(document, llm)
        .await
}

/// Auto-merging index over `documents`; `chunk_sizes` defaults to
/// `[2048, 512, 128]`.
pub async fn build_automerging_index(
    documents: &[Document],
    llm: Arc<dyn LanguageModel>,
    embed_model: &EmbedModel,
    save_dir: impl AsRef<Path>,
    chunk_sizes: Option<Vec<usize>>,
) -> Result<VectorStoreIndex> {
    let mut builder = AutoMergingIndexBuilder::new(save_dir.as_ref()).embed_model(*embed_model);
    if let Some(sizes) = chunk_sizes {
        builder = builder.chunk_sizes(sizes)?;
    }
    builder.build(documents, llm).await
}
