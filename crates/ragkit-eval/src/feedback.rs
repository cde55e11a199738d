//! Feedback definitions: which provider function scores which parts of a
//! query record, and how the per-call scores are combined.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A score in `[0, 1]` with the grader's reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub score: f32,
    pub reasons: String,
}

#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    fn name(&self) -> &str;

    /// How relevant `response` is to `prompt`.
    async fn relevance_with_cot_reasons(&self, prompt: &str, response: &str) -> Result<Scored>;

    /// How well `statement` is supported by `source`.
    async fn groundedness_measure_with_cot_reasons(&self, source: &str, statement: &str) -> Result<Scored>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackFn {
    RelevanceWithCotReasons,
    GroundednessMeasureWithCotReasons,
}

impl FeedbackFn {
    pub fn arity(&self) -> usize {
        2
    }
}

impl fmt::Display for FeedbackFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelevanceWithCotReasons => f.write_str("relevance_with_cot_reasons"),
            Self::GroundednessMeasureWithCotReasons => f.write_str("groundedness_measure_with_cot_reasons"),
        }
    }
}

/// Part of a query record passed to a feedback function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Input,
    Output,
    /// Text of every source node, one call per node.
    SourceNodesText,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Min,
    Max,
}

impl Aggregation {
    pub fn apply(&self, scores: &[f32]) -> Option<f32> {
        if scores.is_empty() {
            return None;
        }
        Some(match self {
            Self::Mean => scores.iter().sum::<f32>() / scores.len() as f32,
            Self::Min => scores.iter().copied().fold(f32::INFINITY, f32::min),
            Self::Max => scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        })
    }
}

/// What a feedback reads from one answered query.
#[derive(Debug, Clone)]
pub struct RecordView<'a> {
    pub input: &'a str,
    pub output: &'a str,
    pub source_texts: &'a [String],
}

impl RecordView<'_> {
    fn select(&self, selector: Selector) -> Vec<String> {
        match selector {
            Selector::Input => vec![self.input.to_string()],
            Selector::Output => vec![self.output.to_string()],
            Selector::SourceNodesText => self.source_texts.to_vec(),
        }
    }
}

/// One invocation of the provider function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCall {
    pub args: Vec<String>,
    pub score: f32,
    pub reasons: String,
}

#[derive(Clone)]
pub struct Feedback {
    name: String,
    func: FeedbackFn,
    provider: Arc<dyn FeedbackProvider>,
    selectors: Vec<Selector>,
    aggregation: Aggregation,
}

impl fmt::Debug for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feedback")
            .field("name", &self.name)
            .field("func", &self.func)
            .field("provider", &self.provider.name())
            .field("selectors", &self.selectors)
            .field("aggregation", &self.aggregation)
            .finish()
    }
}

impl Feedback {
    pub fn new(func: FeedbackFn, provider: Arc<dyn FeedbackProvider>) -> Self {
        Self { name: func.to_string(), func, provider, selectors: Vec::new(), aggregation: Aggregation::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_input_output(self) -> Self {
        self.on_input().on_output()
    }

    pub fn on_input(self) -> Self {
        self.on(Selector::Input)
    }

    pub fn on_output(self) -> Self {
        self.on(Selector::Output)
    }

    pub fn on(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn feedback_name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> FeedbackFn {
        self.func
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Argument tuples: the cartesian product of the selected values.
    pub fn argument_sets(&self, view: &RecordView<'_>) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = vec![Vec::new()];
        for selector in &self.selectors {
            let values = view.select(*selector);
            sets = sets
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut next = prefix.clone();
                        next.push(v.clone());
                        next
                    })
                })
                .collect();
        }
        sets
    }

    /// Every call's score plus the aggregate; `None` when there was nothing
    /// to score (e.g. no source nodes).
    pub async fn evaluate(&self, view: &RecordView<'_>) -> Result<(Option<f32>, Vec<FeedbackCall>)> {
        if self.selectors.len() != self.func.arity() {
            anyhow::bail!("feedback '{}' needs {} selectors, has {}", self.name, self.func.arity(), self.selectors.len());
        }
        let mut calls = Vec::new();
        for args in self.argument_sets(view) {
            let scored = match self.func {
                FeedbackFn::RelevanceWithCotReasons => self.provider.relevance_with_cot_reasons(&args[0], &args[1]).await?,
                FeedbackFn::GroundednessMeasureWithCotReasons => {
                    self.provider.groundedness_measure_with_cot_reasons(&args[0], &args[1]).await?
                }
            };
            calls.push(FeedbackCall { args, score: scored.score, reasons: scored.reasons });
        }
        let scores: Vec<f32> = calls.iter().map(|c| c.score).collect();
        Ok((self.aggregation.apply(&scores), calls))
    }
}

/// Answer Relevance, Context Relevance and Groundedness.
pub fn default_feedbacks(provider: Arc<dyn FeedbackProvider>) -> Vec<Feedback> {
    let qa_relevance = Feedback::new(FeedbackFn::RelevanceWithCotReasons, Arc::clone(&provider))
        .name("Answer Relevance")
        .on_input_output();
    let qs_relevance = Feedback::new(FeedbackFn::RelevanceWithCotReasons, Arc::clone(&provider))
        .name("Context Relevance")
        .on_input()
        .on(Selector::SourceNodesText)
        .aggregate(Aggregation::Mean);
    let groundedness = Feedback::new(FeedbackFn::GroundednessMeasureWithCotReasons, provider)
        .name("Groundedness")
        .on(Selector::SourceNodesText)
        .on_output();
    vec![qa_relevance, qs_relevance, groundedness]
}
