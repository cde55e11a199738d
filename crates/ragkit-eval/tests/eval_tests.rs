use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use ragkit_core::types::{Node, NodeWithScore};
use ragkit_eval::{
    get_prebuilt_recorder, get_recorder, Aggregation, Feedback, FeedbackFn, FeedbackProvider, FeedbackStatus, RecordStore, Scored,
    Selector,
};
use ragkit_query::{QueryEngine, Response};

struct CannedEngine;

#[async_trait]
impl QueryEngine for CannedEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let sources = ["Lakes freeze in winter.", "Geese migrate south."]
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let node = Node { id: format!("n{i}"), text: t.to_string(), metadata: Default::default(), relationships: Default::default() };
                NodeWithScore::new(node, 0.9 - i as f32 * 0.1)
            })
            .collect();
        Ok(Response { response: format!("answer to {query}"), source_nodes: sources })
    }
}

/// Relevance scores by whether the second argument mentions "Lakes";
/// groundedness is fixed. Optionally blocks until released.
struct StubProvider {
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl StubProvider {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), gate: None }
    }
}

#[async_trait]
impl FeedbackProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn relevance_with_cot_reasons(&self, _prompt: &str, response: &str) -> Result<Scored> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let score = if response.contains("Lakes") { 1.0 } else { 0.5 };
        Ok(Scored { score, reasons: "stub".into() })
    }

    async fn groundedness_measure_with_cot_reasons(&self, _source: &str, _statement: &str) -> Result<Scored> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Scored { score: 0.25, reasons: "stub".into() })
    }
}

struct FailingProvider;

#[async_trait]
impl FeedbackProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn relevance_with_cot_reasons(&self, _prompt: &str, _response: &str) -> Result<Scored> {
        anyhow::bail!("grader unavailable")
    }

    async fn groundedness_measure_with_cot_reasons(&self, _source: &str, _statement: &str) -> Result<Scored> {
        anyhow::bail!("grader unavailable")
    }
}

#[test]
fn prebuilt_recorder_has_three_feedbacks() {
    let recorder = get_prebuilt_recorder(Arc::new(CannedEngine), "app_1", Arc::new(StubProvider::new()));
    assert_eq!(recorder.app_id(), "app_1");
    let names: Vec<&str> = recorder.feedbacks().iter().map(|f| f.feedback_name()).collect();
    assert_eq!(names, ["Answer Relevance", "Context Relevance", "Groundedness"]);

    let answer = &recorder.feedbacks()[0];
    assert_eq!(answer.func(), FeedbackFn::RelevanceWithCotReasons);
    assert_eq!(answer.selectors(), [Selector::Input, Selector::Output]);

    let context = &recorder.feedbacks()[1];
    assert_eq!(context.func(), FeedbackFn::RelevanceWithCotReasons);
    assert_eq!(context.selectors(), [Selector::Input, Selector::SourceNodesText]);
    assert_eq!(context.aggregation(), Aggregation::Mean);

    let groundedness = &recorder.feedbacks()[2];
    assert_eq!(groundedness.func(), FeedbackFn::GroundednessMeasureWithCotReasons);
    assert_eq!(groundedness.selectors(), [Selector::SourceNodesText, Selector::Output]);
    assert_eq!(groundedness.aggregation(), Aggregation::Mean);
    assert!(recorder.feedbacks().iter().all(|f| f.provider_name() == "stub"));
}

#[tokio::test]
async fn scores_every_feedback_for_a_query() {
    let provider = Arc::new(StubProvider::new());
    let recorder = get_prebuilt_recorder(Arc::new(CannedEngine), "app_1", provider.clone());

    let (response, handle) = recorder.query("what freezes?").await.unwrap();
    assert_eq!(response.response, "answer to what freezes?");
    let record = handle.wait().await.unwrap();

    assert_eq!(record.input, "what freezes?");
    assert_eq!(record.source_texts.len(), 2);
    assert_eq!(record.feedback_results.len(), 3);
    assert!(record.feedback_results.iter().all(|r| r.status == FeedbackStatus::Done));
    assert_eq!(record.feedback_score("Answer Relevance"), Some(0.5));
    // one source mentions "Lakes", one doesn't
    assert!((record.feedback_score("Context Relevance").unwrap() - 0.75).abs() < 1e-6);
    assert_eq!(record.feedback_score("Groundedness"), Some(0.25));
    // 1 answer relevance + 2 context relevance + 2 groundedness
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    assert_eq!(recorder.store().len(), 1);
}

#[tokio::test]
async fn answer_is_returned_before_scoring_finishes() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(StubProvider { calls: AtomicUsize::new(0), gate: Some(gate.clone()) });
    let feedback = Feedback::new(FeedbackFn::RelevanceWithCotReasons, provider.clone()).name("Answer Relevance").on_input_output();
    let recorder = get_recorder(Arc::new(CannedEngine), vec![feedback], "gated");

    let (response, handle) = recorder.query("q").await.unwrap();
    assert_eq!(response.response, "answer to q");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(recorder.store().is_empty());

    gate.notify_one();
    let record = handle.wait().await.unwrap();
    assert_eq!(record.feedback_score("Answer Relevance"), Some(0.5));
    assert_eq!(recorder.store().len(), 1);
}

#[tokio::test]
async fn failed_feedback_is_recorded_not_raised() {
    let recorder = get_prebuilt_recorder(Arc::new(CannedEngine), "app_1", Arc::new(FailingProvider));
    let (response, handle) = recorder.query("q").await.unwrap();
    assert!(!response.response.is_empty());

    let record = handle.wait().await.unwrap();
    assert_eq!(record.feedback_results.len(), 3);
    for result in &record.feedback_results {
        assert_eq!(result.status, FeedbackStatus::Failed);
        assert_eq!(result.score, None);
        assert!(result.error.as_deref().unwrap_or_default().contains("grader unavailable"));
    }
}

#[tokio::test]
async fn feedback_with_wrong_selector_count_fails() {
    let bad = Feedback::new(FeedbackFn::RelevanceWithCotReasons, Arc::new(StubProvider::new())).name("Half").on_input();
    let recorder = get_recorder(Arc::new(CannedEngine), vec![bad], "app_1");
    let (_, handle) = recorder.query("q").await.unwrap();
    let record = handle.wait().await.unwrap();
    assert_eq!(record.feedback_results[0].status, FeedbackStatus::Failed);
}

#[tokio::test]
async fn leaderboard_groups_by_app() {
    let store = RecordStore::in_memory();
    let engine = Arc::new(CannedEngine);
    let provider: Arc<dyn FeedbackProvider> = Arc::new(StubProvider::new());

    let a = get_prebuilt_recorder(engine.clone(), "app_a", provider.clone()).with_store(store.clone());
    let b = get_prebuilt_recorder(engine, "app_b", provider).with_store(store.clone());
    for q in ["one", "two"] {
        a.query(q).await.unwrap().1.wait().await.unwrap();
    }
    b.query("three").await.unwrap().1.wait().await.unwrap();

    let board = store.leaderboard().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].app_id, "app_a");
    assert_eq!(board[0].records, 2);
    assert_eq!(board[1].records, 1);
    assert!((board[0].feedback_means["Context Relevance"] - 0.75).abs() < 1e-6);
    assert_eq!(board[1].feedback_means["Groundedness"], 0.25);
    assert_eq!(store.records_for("app_b").unwrap().len(), 1);
}

#[tokio::test]
async fn records_persist_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records").join("records.jsonl");

    let store = RecordStore::with_jsonl(&path).unwrap();
    let recorder = get_prebuilt_recorder(Arc::new(CannedEngine), "app_1", Arc::new(StubProvider::new())).with_store(store);
    let written = recorder.query("q").await.unwrap().1.wait().await.unwrap();

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 1);

    let reopened = RecordStore::with_jsonl(&path).unwrap();
    let records = reopened.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], written);
}
