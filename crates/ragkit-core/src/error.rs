use thiserror::Error;

/// Errors raised by this workspace itself. Collaborator failures (I/O,
/// LanceDB, candle, HTTP) travel as `anyhow::Error` untouched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported embedding model '{0}'")]
    UnsupportedEmbedModel(String),

    #[error("Unsupported rerank model '{0}'")]
    UnsupportedRerankModel(String),

    #[error("Invalid chunk sizes {0:?}: expected a non-empty, strictly decreasing list")]
    InvalidChunkSizes(Vec<usize>),

    #[error("Persisted index at {path} is incomplete: missing {missing}")]
    IncompleteIndex { path: String, missing: String },

    #[error("Node not found in docstore: {0}")]
    NodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
