use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ragkit_core::types::hash_hex;
use ragkit_query::{QueryEngine, Response};

use crate::feedback::{default_feedbacks, Feedback, FeedbackProvider, RecordView};
use crate::store::{FeedbackResult, FeedbackStatus, Record, RecordStore};

/// Wraps a query engine: every query is answered immediately and scored by
/// the attached feedbacks in the background under `app_id`.
pub struct Recorder {
    engine: Arc<dyn QueryEngine>,
    feedbacks: Arc<Vec<Feedback>>,
    app_id: String,
    store: RecordStore,
}

/// Completion of one record's feedback scoring.
pub struct RecordHandle {
    pub record_id: String,
    handle: JoinHandle<Result<Record>>,
}

impl RecordHandle {
    /// Wait for feedback scoring; returns the stored record.
    pub async fn wait(self) -> Result<Record> {
        self.handle.await.map_err(|e| anyhow!("feedback task for {} failed: {}", self.record_id, e))?
    }
}

impl Recorder {
    pub fn new(engine: Arc<dyn QueryEngine>, feedbacks: Vec<Feedback>, app_id: impl Into<String>) -> Self {
        Self { engine, feedbacks: Arc::new(feedbacks), app_id: app_id.into(), store: RecordStore::in_memory() }
    }

    pub fn with_store(mut self, store: RecordStore) -> Self {
        self.store = store;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn feedbacks(&self) -> &[Feedback] {
        &self.feedbacks
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Answer `query`; feedbacks run on a spawned task.
    pub async fn query(&self, query: &str) -> Result<(Response, RecordHandle)> {
        let start = Instant::now();
        let response = self.engine.query(query).await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        let ts = Utc::now();
        let record_id = format!("record_{}", &hash_hex(&format!("{}:{}:{}", self.app_id, query, ts.timestamp_nanos_opt().unwrap_or_default()))[..16]);

        let record = Record {
            record_id: record_id.clone(),
            app_id: self.app_id.clone(),
            input: query.to_string(),
            output: response.response.clone(),
            source_texts: response.source_nodes.iter().map(|n| n.node.text.clone()).collect(),
            latency_ms,
            ts,
            feedback_results: Vec::new(),
        };
        let feedbacks = Arc::clone(&self.feedbacks);
        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            let record = score_record(record, &feedbacks).await;
            store.insert(record.clone())?;
            Ok(record)
        });
        Ok((response, RecordHandle { record_id, handle }))
    }
}

async fn score_record(mut record: Record, feedbacks: &[Feedback]) -> Record {
    let view = RecordView { input: &record.input, output: &record.output, source_texts: &record.source_texts };
    let results = join_all(feedbacks.iter().map(|f| async {
        match f.evaluate(&view).await {
            Ok((score, calls)) => FeedbackResult {
                name: f.feedback_name().to_string(),
                status: FeedbackStatus::Done,
                score,
                calls,
                error: None,
            },
            Err(e) => {
                warn!(feedback = f.feedback_name(), error = %e, "feedback failed");
                FeedbackResult {
                    name: f.feedback_name().to_string(),
                    status: FeedbackStatus::Failed,
                    score: None,
                    calls: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }))
    .await;
    for r in &results {
        info!(record_id = %record.record_id, feedback = %r.name, score = ?r.score, "feedback result");
    }
    record.feedback_results = results;
    record
}

pub fn get_recorder(engine: Arc<dyn QueryEngine>, feedbacks: Vec<Feedback>, app_id: &str) -> Recorder {
    Recorder::new(engine, feedbacks, app_id)
}

/// Recorder with Answer Relevance, Context Relevance and Groundedness.
pub fn get_prebuilt_recorder(engine: Arc<dyn QueryEngine>, app_id: &str, provider: Arc<dyn FeedbackProvider>) -> Recorder {
    Recorder::new(engine, default_feedbacks(provider), app_id)
}
