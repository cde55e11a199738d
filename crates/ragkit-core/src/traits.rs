use async_trait::async_trait;

/// Dense text embedder. Implementations return L2-normalized vectors of
/// `dim()` floats.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model, persisted alongside the index.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Cross-encoder style relevance scorer: one score per `(query, text)` pair,
/// higher is more relevant.
pub trait Reranker: Send + Sync {
    fn model_id(&self) -> &str;
    fn score(&self, query: &str, texts: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Text-completion language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
