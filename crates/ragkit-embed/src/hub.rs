//! Local model directory resolution and Hugging Face hub downloads.
//!
//! Models live under `<root>/<repo>/` (e.g. `models/BAAI/bge-small-en-v1.5/`).
//! `APP_MODEL_DIR` overrides the configured root.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub const REQUIRED_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];
const HUB_URL: &str = "https://huggingface.co";

pub fn models_root(configured: &Path) -> PathBuf {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            info!(dir = %p.display(), "using APP_MODEL_DIR");
            return p;
        }
    }
    configured.to_path_buf()
}

pub fn model_dir(root: &Path, repo: &str) -> PathBuf {
    models_root(root).join(repo)
}

pub fn missing_files(dir: &Path) -> Vec<&'static str> {
    REQUIRED_FILES
        .into_iter()
        .filter(|f| {
            // pytorch weights are an accepted substitute for safetensors
            !(dir.join(f).exists() || (*f == "model.safetensors" && dir.join("pytorch_model.bin").exists()))
        })
        .collect()
}

/// Local directory of `repo`, or an error naming the missing files.
pub fn resolve_model_dir(root: &Path, repo: &str) -> Result<PathBuf> {
    let dir = model_dir(root, repo);
    let missing = missing_files(&dir);
    if !missing.is_empty() {
        return Err(anyhow!("Model {} incomplete at {}: missing {}", repo, dir.display(), missing.join(", ")));
    }
    Ok(dir)
}

/// Download any missing files of `repo` from the hub. `hf_token` is sent as
/// a bearer token when present and non-empty.
pub async fn ensure_model_files(root: &Path, repo: &str, hf_token: Option<&str>) -> Result<PathBuf> {
    let dir = model_dir(root, repo);
    let missing = missing_files(&dir);
    if missing.is_empty() {
        return Ok(dir);
    }
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let client = reqwest::Client::new();
    for file in missing {
        let url = format!("{HUB_URL}/{repo}/resolve/main/{file}");
        info!(%url, "downloading model file");
        let mut request = client.get(&url);
        if let Some(token) = hf_token.filter(|t| !t.trim().is_empty()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        let expected = response.content_length();
        let bytes = response.bytes().await?;
        if let Some(len) = expected.filter(|&len| len != bytes.len() as u64) {
            return Err(anyhow!("truncated download of {}: got {} of {} bytes", url, bytes.len(), len));
        }
        store_file(&dir, file, &bytes)?;
    }
    Ok(dir)
}

/// Write `bytes` to `<dir>/<file>.part`, then rename into place, so an
/// interrupted write never leaves a file that counts as present.
pub fn store_file(dir: &Path, file: &str, bytes: &[u8]) -> Result<PathBuf> {
    let target = dir.join(file);
    let partial = dir.join(format!("{file}.part"));
    std::fs::write(&partial, bytes).with_context(|| format!("writing {}", partial.display()))?;
    std::fs::rename(&partial, &target).with_context(|| format!("moving {} into place", partial.display()))?;
    Ok(target)
}
