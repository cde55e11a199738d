use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use ragkit_core::model::{EmbedModel, Pooling, RerankModel};
use ragkit_core::traits::{Embedder, Reranker};

mod bert;
mod device;
mod hashed;
pub mod hub;
mod pool;
mod rerank;
mod tokenize;

pub use bert::BgeEmbedder;
pub use hashed::HashingEmbedder;
pub use pool::{cls_l2, masked_mean_l2, pool};
pub use rerank::{CrossEncoderReranker, LexicalReranker};

/// `APP_USE_FAKE_EMBEDDINGS=1|true` swaps local models for the hashing embedder.
pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Embedder for `model`, loading weights from `models_root/<repo>`.
pub fn get_embedder(model: &EmbedModel, models_root: &Path, pooling: Option<Pooling>) -> Result<Arc<dyn Embedder>> {
    match model {
        EmbedModel::Hashed { dim } => Ok(Arc::new(HashingEmbedder::new(*dim))),
        EmbedModel::Local(_) if use_fake_embeddings() => {
            info!(dim = model.dim(), "using hashing embedder (APP_USE_FAKE_EMBEDDINGS)");
            Ok(Arc::new(HashingEmbedder::new(model.dim())))
        }
        EmbedModel::Local(spec) => {
            let dir = hub::resolve_model_dir(models_root, spec.repo())?;
            let pooling = pooling.unwrap_or_else(|| model.default_pooling());
            Ok(Arc::new(BgeEmbedder::load(*spec, &dir, pooling)?))
        }
    }
}

pub fn get_reranker(model: &RerankModel, models_root: &Path) -> Result<Arc<dyn Reranker>> {
    match model.repo() {
        None => Ok(Arc::new(LexicalReranker)),
        Some(_) if use_fake_embeddings() => {
            info!("using lexical reranker (APP_USE_FAKE_EMBEDDINGS)");
            Ok(Arc::new(LexicalReranker))
        }
        Some(repo) => {
            let dir = hub::resolve_model_dir(models_root, repo)?;
            Ok(Arc::new(CrossEncoderReranker::load(repo, &dir)?))
        }
    }
}

/// Download the files of every model the settings name that are not yet
/// present under `models_root`.
pub async fn prefetch_models(
    embed: &EmbedModel,
    rerank: &RerankModel,
    models_root: &Path,
    hf_token: Option<&str>,
) -> Result<()> {
    if let EmbedModel::Local(spec) = embed {
        hub::ensure_model_files(models_root, spec.repo(), hf_token).await?;
    }
    if let Some(repo) = rerank.repo() {
        hub::ensure_model_files(models_root, repo, hf_token).await?;
    }
    Ok(())
}
