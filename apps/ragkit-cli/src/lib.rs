//! Wiring shared by the ragkit binaries: settings, credentials, models and
//! the two index flavors.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use ragkit_core::config::{resolve_with_base, Config, Settings};
use ragkit_core::credentials::get_hf_api_key;
use ragkit_core::loader::DirectoryReader;
use ragkit_core::traits::{Embedder, LanguageModel, Reranker};
use ragkit_core::types::Document;
use ragkit_embed::{get_embedder, get_reranker, prefetch_models, use_fake_embeddings};
use ragkit_index::{storage::ensure_complete, AutoMergingIndexBuilder, SentenceWindowIndexBuilder, VectorStoreIndex};
use ragkit_llm::OpenAiChat;
use ragkit_query::{
    get_automerging_query_engine, get_sentence_window_query_engine, AutoMergingParams, RetrieverQueryEngine,
    SentenceWindowParams,
};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChoice {
    SentenceWindow,
    AutoMerging,
}

impl IndexChoice {
    /// Default application id used for evaluation records.
    pub fn app_id(&self) -> &'static str {
        match self {
            Self::SentenceWindow => "sentence_window",
            Self::AutoMerging => "automerging",
        }
    }
}

pub struct App {
    pub settings: Settings,
    pub base: PathBuf,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
}

impl App {
    /// Load configuration from the working directory, fetch missing model
    /// files when allowed, and construct the model collaborators.
    pub async fn init() -> Result<Self> {
        let config = Config::load().map_err(|e| {
            eprintln!("Error loading config: {}", e);
            e
        })?;
        let settings = config.settings()?;
        let base = PathBuf::from(".");
        let models_dir = resolve_with_base(&base, &settings.models.dir);

        if settings.models.download && !use_fake_embeddings() {
            let token = get_hf_api_key();
            prefetch_models(&settings.embedding.model, &settings.rerank.model, &models_dir, token.as_deref()).await?;
        }
        let embedder = get_embedder(&settings.embedding.model, &models_dir, settings.embedding.pooling)?;
        let reranker = get_reranker(&settings.rerank.model, &models_dir)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChat::from_settings(&settings.llm)?);
        info!(embed = %embedder.model_id(), llm = %llm.model_name(), "components ready");

        Ok(Self { settings, base, llm, embedder, reranker })
    }

    pub fn index_dir(&self, choice: IndexChoice) -> PathBuf {
        let dir = match choice {
            IndexChoice::SentenceWindow => &self.settings.index.sentence_window_dir,
            IndexChoice::AutoMerging => &self.settings.index.automerging_dir,
        };
        resolve_with_base(&self.base, dir)
    }

    /// Build the index over `documents`, or load it when already persisted.
    /// The sentence-window index covers all documents merged into one.
    pub async fn build_index(&self, choice: IndexChoice, documents: &[Document]) -> Result<VectorStoreIndex> {
        match choice {
            IndexChoice::SentenceWindow => {
                let document = Document::merged(documents);
                SentenceWindowIndexBuilder::from_settings(&self.settings, &self.base)
                    .embedder(Arc::clone(&self.embedder))
                    .build(&document, Arc::clone(&self.llm))
                    .await
            }
            IndexChoice::AutoMerging => {
                AutoMergingIndexBuilder::from_settings(&self.settings, &self.base)?
                    .embedder(Arc::clone(&self.embedder))
                    .build(documents, Arc::clone(&self.llm))
                    .await
            }
        }
    }

    /// Build from `data_dir` when given; otherwise load the persisted index.
    pub async fn open_index(&self, choice: IndexChoice, data_dir: Option<&Path>) -> Result<Arc<VectorStoreIndex>> {
        let index = match data_dir {
            Some(dir) => {
                let documents = load_documents(dir, None)?;
                self.build_index(choice, &documents).await?
            }
            None => {
                let dir = self.index_dir(choice);
                ensure_complete(&dir).map_err(|e| anyhow!("{} (run ragkit-indexer first or pass --data-dir)", e))?;
                VectorStoreIndex::load_from_storage(&dir, Arc::clone(&self.embedder), Arc::clone(&self.llm)).await?
            }
        };
        Ok(Arc::new(index))
    }

    pub fn query_engine(&self, choice: IndexChoice, index: Arc<VectorStoreIndex>) -> RetrieverQueryEngine {
        let llm = Arc::clone(&self.llm);
        let reranker = Arc::clone(&self.reranker);
        let max_ctx = self.settings.llm.max_context_tokens;
        match choice {
            IndexChoice::SentenceWindow => get_sentence_window_query_engine(
                llm,
                index,
                reranker,
                SentenceWindowParams::from_settings(&self.settings.query, max_ctx),
            ),
            IndexChoice::AutoMerging => get_automerging_query_engine(
                llm,
                index,
                reranker,
                AutoMergingParams::from_settings(&self.settings.query, max_ctx),
            ),
        }
    }
}

pub fn load_documents(data_dir: &Path, limit: Option<usize>) -> Result<Vec<Document>> {
    let reader = DirectoryReader::new();
    let documents = match limit {
        Some(n) => reader.load_directory_limited(data_dir, n)?,
        None => reader.load_directory(data_dir)?,
    };
    if documents.is_empty() {
        return Err(anyhow!("no .txt or .md files under {}", data_dir.display()));
    }
    Ok(documents)
}

/// Non-empty, trimmed lines of a questions file.
pub fn read_questions(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| anyhow!("reading {}: {}", path.display(), e))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_skip_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.txt");
        std::fs::write(&path, "What is a window?\n\n  How do parents merge?  \n").unwrap();
        assert_eq!(read_questions(&path).unwrap(), ["What is a window?", "How do parents merge?"]);
    }

    #[test]
    fn empty_data_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(dir.path(), None).is_err());
    }
}
