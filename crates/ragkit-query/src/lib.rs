//! Query engines over persisted indexes: retrieval, postprocessing (window
//! replacement, auto-merging, rerank) and compact-and-refine synthesis.

pub mod engine;
pub mod postprocessor;
pub mod response;
pub mod retriever;
pub mod synthesizer;

pub use engine::{
    get_automerging_query_engine, get_sentence_window_query_engine, AutoMergingParams, QueryEngine,
    RetrieverQueryEngine, SentenceWindowParams,
};
pub use postprocessor::{MetadataReplacementPostProcessor, NodePostprocessor, SentenceTransformerRerank};
pub use response::Response;
pub use retriever::{AutoMergingRetriever, Retriever, VectorIndexRetriever};
pub use synthesizer::CompactAndRefine;
