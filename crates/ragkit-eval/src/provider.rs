//! Language-model graded feedback: the model is asked for a 0-10 score with
//! supporting evidence, and the `Score:` line is normalized to `[0, 1]`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use ragkit_core::node_parser::split_sentences;
use ragkit_core::traits::LanguageModel;

use crate::feedback::{FeedbackProvider, Scored};

const RELEVANCE_TEMPLATE: &str = "You are a RELEVANCE grader; providing the relevance of the given RESPONSE to the given PROMPT.\n\
Respond only as a number from 0 to 10 where 0 is the least relevant and 10 is the most relevant.\n\n\
A few additional scoring guidelines:\n\
- Long RESPONSES should score equally well as short RESPONSES.\n\
- RESPONSE must be relevant to the entire PROMPT to get a score of 10.\n\
- RESPONSE that is relevant to only part of the PROMPT should get a lower score.\n\
- RESPONSE that confidently answers a different question should score 0.\n\n\
PROMPT: {prompt}\n\n\
RESPONSE: {response}\n\n\
Please answer using the entire template below.\n\n\
TEMPLATE:\n\
Criteria: <Provide the criteria for this evaluation>\n\
Supporting Evidence: <Provide your reasons for scoring based on the listed criteria step by step.>\n\
Score: <The score 0-10 based on the given criteria>";

const GROUNDEDNESS_TEMPLATE: &str = "You are an INFORMATION OVERLAP classifier; providing the overlap of information between the source and statement.\n\
Respond only as a number from 0 to 10 where 0 is no information overlap and 10 is all information is overlapping.\n\
Never elaborate.\n\n\
SOURCE: {premise}\n\n\
Hypothesis: {hypothesis}\n\n\
Please answer with the template below for the hypothesis.\n\n\
TEMPLATE:\n\
Statement Sentence: <Sentence>,\n\
Supporting Evidence: <Identify and describe the location in the source where the information matches the sentence. Provide a detailed, human-readable summary indicating the path or key details.>\n\
Score: <Output a number between 0-10 where 0 is no information overlap and 10 is all information is overlapping>";

pub struct LlmFeedbackProvider {
    llm: Arc<dyn LanguageModel>,
    name: String,
}

impl LlmFeedbackProvider {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        let name = format!("llm:{}", llm.model_name());
        Self { llm, name }
    }

    async fn grade(&self, prompt: String) -> Result<Scored> {
        let reply = self.llm.complete(&prompt).await?;
        let score = parse_score(&reply).ok_or_else(|| anyhow!("no score in grader reply: {}", reply.trim()))?;
        debug!(provider = %self.name, score, "graded");
        Ok(Scored { score, reasons: reply })
    }
}

#[async_trait]
impl FeedbackProvider for LlmFeedbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn relevance_with_cot_reasons(&self, prompt: &str, response: &str) -> Result<Scored> {
        let prompt = RELEVANCE_TEMPLATE.replace("{prompt}", prompt).replace("{response}", response);
        self.grade(prompt).await
    }

    /// Each sentence of `statement` is graded against `source`; the score is
    /// the mean over sentences.
    async fn groundedness_measure_with_cot_reasons(&self, source: &str, statement: &str) -> Result<Scored> {
        let sentences = split_sentences(statement);
        if sentences.is_empty() {
            return Ok(Scored { score: 0.0, reasons: "empty statement".to_string() });
        }
        let mut total = 0.0;
        let mut reasons = Vec::with_capacity(sentences.len());
        for sentence in &sentences {
            let prompt = GROUNDEDNESS_TEMPLATE.replace("{premise}", source).replace("{hypothesis}", sentence);
            let scored = self.grade(prompt).await?;
            total += scored.score;
            reasons.push(format!("STATEMENT: {sentence}\n{}", scored.reasons.trim()));
        }
        Ok(Scored { score: total / sentences.len() as f32, reasons: reasons.join("\n\n") })
    }
}

/// Last `Score:` line's number (0-10) as a fraction; falls back to the last
/// number anywhere in the reply.
pub fn parse_score(reply: &str) -> Option<f32> {
    let from_line = reply
        .lines()
        .rev()
        .find_map(|l| l.trim().strip_prefix("Score:").and_then(first_number));
    let raw = from_line.or_else(|| reply.lines().rev().find_map(last_number))?;
    Some((raw / 10.0).clamp(0.0, 1.0))
}

fn numbers(text: &str) -> impl Iterator<Item = f32> + '_ {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter_map(|t| t.trim_matches('.').parse::<f32>().ok())
}

fn first_number(text: &str) -> Option<f32> {
    numbers(text).next()
}

fn last_number(text: &str) -> Option<f32> {
    numbers(text).last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_score_line() {
        let reply = "Criteria: relevance\nSupporting Evidence: it answers. 3 points.\nScore: 8";
        assert_eq!(parse_score(reply), Some(0.8));
        assert_eq!(parse_score("Score: 10/10"), Some(1.0));
        assert_eq!(parse_score("I would say 7"), Some(0.7));
        assert_eq!(parse_score("Score: 42"), Some(1.0));
        assert_eq!(parse_score("no idea"), None);
    }
}
