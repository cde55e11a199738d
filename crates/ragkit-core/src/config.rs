//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (nested keys split on `__`, e.g.
//! `APP_INDEX__WINDOW_SIZE=2`). Provides helpers to expand `~` and `${VAR}`
//! and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::model::{EmbedModel, Pooling, RerankModel};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load with config files looked up in `base`.
    pub fn load_from(base: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The whole configuration as typed settings.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        settings.validate()?;
        if matches!(env, "prod" | "production") && settings.embedding.model.to_string().starts_with("hash:") {
            return Err(Error::InvalidConfig("hashing embedder is not allowed in production".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub rerank: RerankSettings,
    pub models: ModelSettings,
    pub query: QuerySettings,
    pub llm: LlmSettings,
    pub eval: EvalSettings,
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_chunk_sizes(&self.index.chunk_sizes)?;
        if self.index.window_size == 0 {
            return Err(Error::InvalidConfig("index.window_size must be at least 1".into()));
        }
        for (name, v) in [
            ("query.sentence_window_top_k", self.query.sentence_window_top_k),
            ("query.sentence_window_rerank_top_n", self.query.sentence_window_rerank_top_n),
            ("query.automerging_top_k", self.query.automerging_top_k),
            ("query.automerging_rerank_top_n", self.query.automerging_rerank_top_n),
        ] {
            if v == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// Chunk sizes must be non-empty and strictly decreasing (coarsest first).
pub fn validate_chunk_sizes(sizes: &[usize]) -> crate::error::Result<()> {
    let decreasing = sizes.windows(2).all(|w| w[0] > w[1]);
    if sizes.is_empty() || !decreasing || sizes.contains(&0) {
        return Err(Error::InvalidChunkSizes(sizes.to_vec()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub sentence_window_dir: String,
    pub automerging_dir: String,
    pub window_size: usize,
    pub chunk_sizes: Vec<usize>,
    pub chunk_overlap: usize,
    pub rebuild_on_stale: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            sentence_window_dir: "sentence_index".to_string(),
            automerging_dir: "merging_index".to_string(),
            window_size: 3,
            chunk_sizes: vec![2048, 512, 128],
            chunk_overlap: 20,
            rebuild_on_stale: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: EmbedModel,
    /// Overrides the model's default pooling.
    pub pooling: Option<Pooling>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub model: RerankModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Root holding one sub-directory per model repo.
    pub dir: String,
    /// Fetch missing model files from the Hugging Face hub.
    pub download: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { dir: "models".to_string(), download: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub sentence_window_top_k: usize,
    pub sentence_window_rerank_top_n: usize,
    pub automerging_top_k: usize,
    pub automerging_rerank_top_n: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            sentence_window_top_k: 6,
            sentence_window_rerank_top_n: 2,
            automerging_top_k: 12,
            automerging_rerank_top_n: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    /// Token budget for packed context in a single synthesis prompt.
    pub max_context_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            base_url: "https://api.openai.com/v1".to_string(),
            max_context_tokens: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    /// JSON-lines file receiving every evaluation record; `None` keeps
    /// records in memory only.
    pub records_path: Option<String>,
    /// Model used by the feedback provider.
    pub feedback_model: String,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self { records_path: Some("eval_records.jsonl".to_string()), feedback_model: "gpt-3.5-turbo".to_string() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_defaults() {
        let s = Settings::default();
        assert_eq!(s.index.window_size, 3);
        assert_eq!(s.index.chunk_sizes, vec![2048, 512, 128]);
        assert_eq!(s.index.sentence_window_dir, "sentence_index");
        assert_eq!(s.index.automerging_dir, "merging_index");
        assert_eq!(s.embedding.model.to_string(), "local:BAAI/bge-small-en-v1.5");
        assert_eq!(s.rerank.model, RerankModel::BgeRerankerBase);
        assert_eq!((s.query.sentence_window_top_k, s.query.sentence_window_rerank_top_n), (6, 2));
        assert_eq!((s.query.automerging_top_k, s.query.automerging_rerank_top_n), (12, 2));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn chunk_sizes_must_decrease() {
        assert!(validate_chunk_sizes(&[2048, 512, 128]).is_ok());
        assert!(validate_chunk_sizes(&[512]).is_ok());
        assert!(validate_chunk_sizes(&[]).is_err());
        assert!(validate_chunk_sizes(&[128, 512]).is_err());
        assert!(validate_chunk_sizes(&[512, 512]).is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[index]\nwindow_size = 2\n\n[embedding]\nmodel = \"hash:32\"\n",
        )
        .unwrap();
        let config = Config::load_from(tmp.path()).expect("load");
        let s = config.settings().expect("settings");
        assert_eq!(s.index.window_size, 2);
        assert_eq!(s.index.chunk_sizes, vec![2048, 512, 128]);
        assert_eq!(s.embedding.model, EmbedModel::Hashed { dim: 32 });
        assert_eq!(config.get::<usize>("query.automerging_top_k").unwrap(), 12);
    }

    #[test]
    fn bad_embed_model_is_rejected_on_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[embedding]\nmodel = \"local:nope\"\n").unwrap();
        assert!(Config::load_from(tmp.path()).is_err());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/data");
        assert_eq!(resolve_with_base(base, "idx"), PathBuf::from("/data/idx"));
        assert_eq!(resolve_with_base(base, "/abs/idx"), PathBuf::from("/abs/idx"));
    }
}
