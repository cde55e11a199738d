//! Closed set of embedding and rerank models, parsed from the identifier
//! strings used in configuration (`local:BAAI/bge-small-en-v1.5`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEmbedModel {
    BgeSmallEnV15,
    BgeBaseEnV15,
    BgeLargeEnV15,
}

impl LocalEmbedModel {
    pub const ALL: [LocalEmbedModel; 3] = [Self::BgeSmallEnV15, Self::BgeBaseEnV15, Self::BgeLargeEnV15];

    /// Hugging Face repository of the model weights.
    pub fn repo(&self) -> &'static str {
        match self {
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
            Self::BgeLargeEnV15 => "BAAI/bge-large-en-v1.5",
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
            Self::BgeLargeEnV15 => 1024,
        }
    }

    pub fn max_len(&self) -> usize {
        512
    }
}

/// Which embedder backs an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmbedModel {
    /// BGE family model run locally through candle.
    Local(LocalEmbedModel),
    /// Deterministic feature-hashing embedder; no model files needed.
    Hashed { dim: usize },
}

impl EmbedModel {
    pub fn dim(&self) -> usize {
        match self {
            Self::Local(m) => m.dim(),
            Self::Hashed { dim } => *dim,
        }
    }

    /// BGE models are trained for CLS pooling.
    pub fn default_pooling(&self) -> Pooling {
        match self {
            Self::Local(_) => Pooling::Cls,
            Self::Hashed { .. } => Pooling::Mean,
        }
    }
}

impl Default for EmbedModel {
    fn default() -> Self {
        Self::Local(LocalEmbedModel::BgeSmallEnV15)
    }
}

impl fmt::Display for EmbedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(m) => write!(f, "local:{}", m.repo()),
            Self::Hashed { dim } => write!(f, "hash:{dim}"),
        }
    }
}

impl FromStr for EmbedModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(repo) = s.strip_prefix("local:") {
            return LocalEmbedModel::ALL
                .into_iter()
                .find(|m| m.repo().eq_ignore_ascii_case(repo))
                .map(Self::Local)
                .ok_or_else(|| Error::UnsupportedEmbedModel(s.to_string()));
        }
        if let Some(dim) = s.strip_prefix("hash:") {
            return match dim.parse::<usize>() {
                Ok(dim) if dim > 0 => Ok(Self::Hashed { dim }),
                _ => Err(Error::UnsupportedEmbedModel(s.to_string())),
            };
        }
        Err(Error::UnsupportedEmbedModel(s.to_string()))
    }
}

impl TryFrom<String> for EmbedModel {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EmbedModel> for String {
    fn from(m: EmbedModel) -> Self {
        m.to_string()
    }
}

/// Token pooling applied to the encoder's last hidden state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Cls,
    Mean,
}

/// Which reranker scores candidates after retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RerankModel {
    BgeRerankerBase,
    BgeRerankerLarge,
    /// Query-term overlap scoring; no model files.
    Lexical,
}

impl RerankModel {
    pub fn repo(&self) -> Option<&'static str> {
        match self {
            Self::BgeRerankerBase => Some("BAAI/bge-reranker-base"),
            Self::BgeRerankerLarge => Some("BAAI/bge-reranker-large"),
            Self::Lexical => None,
        }
    }
}

impl Default for RerankModel {
    fn default() -> Self {
        Self::BgeRerankerBase
    }
}

impl fmt::Display for RerankModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repo().unwrap_or("lexical"))
    }
}

impl FromStr for RerankModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baai/bge-reranker-base" => Ok(Self::BgeRerankerBase),
            "baai/bge-reranker-large" => Ok(Self::BgeRerankerLarge),
            "lexical" => Ok(Self::Lexical),
            _ => Err(Error::UnsupportedRerankModel(s.to_string())),
        }
    }
}

impl TryFrom<String> for RerankModel {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RerankModel> for String {
    fn from(m: RerankModel) -> Self {
        m.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_embed_model_matches_identifier() {
        let m: EmbedModel = "local:BAAI/bge-small-en-v1.5".parse().unwrap();
        assert_eq!(m, EmbedModel::default());
        assert_eq!(m.to_string(), "local:BAAI/bge-small-en-v1.5");
        assert_eq!(m.dim(), 384);
        assert_eq!(m.default_pooling(), Pooling::Cls);
    }

    #[test]
    fn unsupported_identifiers_fail_at_parse_time() {
        assert!("local:some/other-model".parse::<EmbedModel>().is_err());
        assert!("openai:text-embedding-3-small".parse::<EmbedModel>().is_err());
        assert!("hash:0".parse::<EmbedModel>().is_err());
        assert!("cohere".parse::<RerankModel>().is_err());
    }

    #[test]
    fn hashed_and_rerank_round_trip_through_serde() {
        let m: EmbedModel = serde_json::from_str("\"hash:64\"").unwrap();
        assert_eq!(m, EmbedModel::Hashed { dim: 64 });
        let r: RerankModel = serde_json::from_str("\"BAAI/bge-reranker-base\"").unwrap();
        assert_eq!(r, RerankModel::default());
        assert_eq!(serde_json::to_string(&RerankModel::Lexical).unwrap(), "\"lexical\"");
    }
}
