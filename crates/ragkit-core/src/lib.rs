//! ragkit-core
//!
//! Shared types, traits, configuration, credentials and node parsers for the
//! sentence-window and auto-merging retrieval pipelines.

pub mod config;
pub mod credentials;
pub mod error;
pub mod loader;
pub mod model;
pub mod node_parser;
pub mod telemetry;
pub mod traits;
pub mod types;
