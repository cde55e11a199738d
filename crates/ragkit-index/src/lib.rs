//! Persisted vector indexes for sentence-window and auto-merging retrieval.
//!
//! Vectors live in LanceDB, nodes in a JSON docstore, index metadata in
//! `index_store.json` written last.

pub mod builders;
pub mod docstore;
pub mod index;
pub mod schema;
pub mod storage;
pub mod vector_store;

pub use builders::{
    build_automerging_index, build_sentence_window_index, content_fingerprint, AutoMergingIndexBuilder,
    SentenceWindowIndexBuilder, StalePolicy, DEFAULT_AUTOMERGING_DIR, DEFAULT_SENTENCE_WINDOW_DIR,
};
pub use docstore::DocStore;
pub use index::VectorStoreIndex;
pub use storage::{IndexKind, IndexStruct, StorageContext};
pub use vector_store::LanceVectorStore;
