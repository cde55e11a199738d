use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use ragkit_core::config::QuerySettings;
use ragkit_core::node_parser::WINDOW_METADATA_KEY;
use ragkit_core::traits::{LanguageModel, Reranker};
use ragkit_core::types::NodeWithScore;
use ragkit_index::VectorStoreIndex;

use crate::postprocessor::{MetadataReplacementPostProcessor, NodePostprocessor, SentenceTransformerRerank};
use crate::response::Response;
use crate::retriever::{AutoMergingRetriever, Retriever, VectorIndexRetriever};
use crate::synthesizer::CompactAndRefine;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str) -> Result<Response>;
}

/// Retriever, then postprocessors in order, then synthesis.
pub struct RetrieverQueryEngine {
    retriever: Arc<dyn Retriever>,
    postprocessors: Vec<Arc<dyn NodePostprocessor>>,
    synthesizer: CompactAndRefine,
    similarity_top_k: usize,
    rerank_top_n: usize,
}

impl RetrieverQueryEngine {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        postprocessors: Vec<Arc<dyn NodePostprocessor>>,
        synthesizer: CompactAndRefine,
        similarity_top_k: usize,
        rerank_top_n: usize,
    ) -> Self {
        Self { retriever, postprocessors, synthesizer, similarity_top_k, rerank_top_n }
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }

    pub fn rerank_top_n(&self) -> usize {
        self.rerank_top_n
    }

    pub fn postprocessor_count(&self) -> usize {
        self.postprocessors.len()
    }

    /// Retrieval and postprocessing without synthesis.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let mut nodes = self.retriever.retrieve(query).await?;
        for p in &self.postprocessors {
            nodes = p.postprocess(nodes, query)?;
        }
        Ok(nodes)
    }
}

#[async_trait]
impl QueryEngine for RetrieverQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let start = Instant::now();
        let source_nodes = self.retrieve(query).await?;
        let response = self.synthesizer.synthesize(query, &source_nodes).await?;
        info!(sources = source_nodes.len(), ms = start.elapsed().as_millis() as u64, "query answered");
        Ok(Response { response, source_nodes })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceWindowParams {
    pub similarity_top_k: usize,
    pub rerank_top_n: usize,
    pub max_context_tokens: usize,
}

impl Default for SentenceWindowParams {
    fn default() -> Self {
        Self { similarity_top_k: 6, rerank_top_n: 2, max_context_tokens: CompactAndRefine::DEFAULT_MAX_CONTEXT_TOKENS }
    }
}

impl SentenceWindowParams {
    pub fn from_settings(query: &QuerySettings, max_context_tokens: usize) -> Self {
        Self {
            similarity_top_k: query.sentence_window_top_k,
            rerank_top_n: query.sentence_window_rerank_top_n,
            max_context_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoMergingParams {
    pub similarity_top_k: usize,
    pub rerank_top_n: usize,
    pub max_context_tokens: usize,
}

impl Default for AutoMergingParams {
    fn default() -> Self {
        Self { similarity_top_k: 12, rerank_top_n: 2, max_context_tokens: CompactAndRefine::DEFAULT_MAX_CONTEXT_TOKENS }
    }
}

impl AutoMergingParams {
    pub fn from_settings(query: &QuerySettings, max_context_tokens: usize) -> Self {
        Self {
            similarity_top_k: query.automerging_top_k,
            rerank_top_n: query.automerging_rerank_top_n,
            max_context_tokens,
        }
    }
}

/// Top-k sentence retrieval, window expansion, rerank to top-n, synthesis.
pub fn get_sentence_window_query_engine(
    llm: Arc<dyn LanguageModel>,
    index: Arc<VectorStoreIndex>,
    reranker: Arc<dyn Reranker>,
    params: SentenceWindowParams,
) -> RetrieverQueryEngine {
    let retriever = Arc::new(VectorIndexRetriever::new(index, params.similarity_top_k));
    let postproc: Arc<dyn NodePostprocessor> = Arc::new(MetadataReplacementPostProcessor::new(WINDOW_METADATA_KEY));
    let rerank: Arc<dyn NodePostprocessor> = Arc::new(SentenceTransformerRerank::new(params.rerank_top_n, reranker));
    RetrieverQueryEngine::new(
        retriever,
        vec![postproc, rerank],
        CompactAndRefine::new(llm).max_context_tokens(params.max_context_tokens),
        params.similarity_top_k,
        params.rerank_top_n,
    )
}

/// Top-k leaf retrieval, merging into parents, rerank to top-n, synthesis.
pub fn get_automerging_query_engine(
    llm: Arc<dyn LanguageModel>,
    index: Arc<VectorStoreIndex>,
    reranker: Arc<dyn Reranker>,
    params: AutoMergingParams,
) -> RetrieverQueryEngine {
    let base: Arc<dyn Retriever> = Arc::new(VectorIndexRetriever::new(Arc::clone(&index), params.similarity_top_k));
    let retriever = Arc::new(AutoMergingRetriever::new(base, index, true));
    let rerank: Arc<dyn NodePostprocessor> = Arc::new(SentenceTransformerRerank::new(params.rerank_top_n, reranker));
    RetrieverQueryEngine::new(
        retriever,
        vec![rerank],
        CompactAndRefine::new(llm).max_context_tokens(params.max_context_tokens),
        params.similarity_top_k,
        params.rerank_top_n,
    )
}
