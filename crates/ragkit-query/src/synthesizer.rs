//! Compact-and-refine answer synthesis: pack as much retrieved context as
//! fits into one prompt, answer, then refine the answer with each further
//! packed chunk.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use ragkit_core::node_parser::{estimate_tokens, TextSplitter};
use ragkit_core::traits::LanguageModel;
use ragkit_core::types::NodeWithScore;

pub const EMPTY_RESPONSE: &str = "Empty Response";

pub const DEFAULT_TEXT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query_str}\n\
Answer: ";

pub const DEFAULT_REFINE_TEMPLATE: &str = "The original query is as follows: {query_str}\n\
We have provided an existing answer: {existing_answer}\n\
We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
------------\n\
{context_msg}\n\
------------\n\
Given the new context, refine the original answer to better answer the query. \
If the context isn't useful, return the original answer.\n\
Refined Answer: ";

pub struct CompactAndRefine {
    llm: Arc<dyn LanguageModel>,
    max_context_tokens: usize,
    text_qa_template: String,
    refine_template: String,
}

impl CompactAndRefine {
    pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 3000;

    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            max_context_tokens: Self::DEFAULT_MAX_CONTEXT_TOKENS,
            text_qa_template: DEFAULT_TEXT_QA_TEMPLATE.to_string(),
            refine_template: DEFAULT_REFINE_TEMPLATE.to_string(),
        }
    }

    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens.max(1);
        self
    }

    pub fn text_qa_template(mut self, template: impl Into<String>) -> Self {
        self.text_qa_template = template.into();
        self
    }

    pub fn refine_template(mut self, template: impl Into<String>) -> Self {
        self.refine_template = template.into();
        self
    }

    pub async fn synthesize(&self, query: &str, nodes: &[NodeWithScore]) -> Result<String> {
        let chunks = self.pack(query, nodes);
        let mut answer: Option<String> = None;
        for (i, context) in chunks.iter().enumerate() {
            let prompt = match &answer {
                None => self.text_qa_template.replace("{context_str}", context).replace("{query_str}", query),
                Some(existing) => self
                    .refine_template
                    .replace("{query_str}", query)
                    .replace("{existing_answer}", existing)
                    .replace("{context_msg}", context),
            };
            debug!(step = i, prompt_tokens = estimate_tokens(&prompt), "synthesis call");
            answer = Some(self.llm.complete(&prompt).await?);
        }
        Ok(answer.unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }

    /// Node texts joined with blank lines into chunks that fit the prompt
    /// budget left after the template and query.
    fn pack(&self, query: &str, nodes: &[NodeWithScore]) -> Vec<String> {
        let overhead = estimate_tokens(&self.refine_template).max(estimate_tokens(&self.text_qa_template)) + estimate_tokens(query);
        let budget = self.max_context_tokens.saturating_sub(overhead).max(16);
        let splitter = TextSplitter::new(budget, 0);

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;
        for text in nodes.iter().map(|n| n.node.text.as_str()).filter(|t| !t.trim().is_empty()) {
            let pieces = if estimate_tokens(text) > budget { splitter.split(text) } else { vec![text.to_string()] };
            for piece in pieces {
                let tokens = estimate_tokens(&piece);
                if !current.is_empty() && current_tokens + tokens > budget {
                    chunks.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(&piece);
                current_tokens += tokens;
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragkit_core::types::Node;
    use std::sync::Mutex;

    struct RecordingLlm(Mutex<Vec<String>>);

    #[async_trait]
    impl LanguageModel for RecordingLlm {
        fn model_name(&self) -> &str { "recording" }
        async fn complete(&self, prompt: &str) -> Result<String> {
            let mut prompts = self.0.lock().unwrap();
            prompts.push(prompt.to_string());
            Ok(format!("answer {}", prompts.len()))
        }
    }

    fn scored(text: &str) -> NodeWithScore {
        NodeWithScore::new(
            Node { id: text.into(), text: text.into(), metadata: Default::default(), relationships: Default::default() },
            1.0,
        )
    }

    #[tokio::test]
    async fn empty_context_gives_empty_response() {
        let llm = Arc::new(RecordingLlm(Mutex::new(Vec::new())));
        let synth = CompactAndRefine::new(llm.clone());
        let answer = synth.synthesize("q", &[]).await.unwrap();
        assert_eq!(answer, EMPTY_RESPONSE);
        assert!(llm.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn small_context_is_one_call() {
        let llm = Arc::new(RecordingLlm(Mutex::new(Vec::new())));
        let synth = CompactAndRefine::new(llm.clone());
        let answer = synth.synthesize("what?", &[scored("first context"), scored("second context")]).await.unwrap();
        assert_eq!(answer, "answer 1");
        let prompts = llm.0.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("first context\n\nsecond context"));
        assert!(prompts[0].contains("Query: what?"));
    }

    #[tokio::test]
    async fn overflow_is_refined() {
        let llm = Arc::new(RecordingLlm(Mutex::new(Vec::new())));
        let synth = CompactAndRefine::new(llm.clone()).max_context_tokens(120);
        let long = "word ".repeat(60);
        let answer = synth.synthesize("q", &[scored(&long), scored(&long)]).await.unwrap();
        let prompts = llm.0.lock().unwrap();
        assert!(prompts.len() >= 2);
        assert!(prompts[1].starts_with("The original query is as follows: q"));
        assert!(prompts[1].contains("We have provided an existing answer: answer 1"));
        assert_eq!(answer, format!("answer {}", prompts.len()));
    }
}
