use anyhow::Result;
use candle_core::Device;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaForSequenceClassification};
use std::collections::HashSet;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::info;

use ragkit_core::traits::Reranker;

use crate::bert::load_weights;
use crate::device::select_device;
use crate::tokenize::{load_tokenizer, tokenize_on_device};

const RERANK_MAX_LEN: usize = 512;

/// BGE cross-encoder reranker (XLM-RoBERTa with a single-logit head).
/// Scores are the sigmoid of the logit, in `[0, 1]`.
pub struct CrossEncoderReranker {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl CrossEncoderReranker {
    pub fn load(repo: &str, model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(model = repo, dir = %model_dir.display(), "loading rerank model");
        let tokenizer = load_tokenizer(&model_dir.join("tokenizer.json"), RERANK_MAX_LEN)?;
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        Ok(Self { model, tokenizer, device, id: repo.to_string() })
    }

    fn score_pair(&self, query: &str, text: &str) -> Result<f32> {
        let enc = tokenize_on_device(&self.tokenizer, (query, text), RERANK_MAX_LEN, &self.device)?;
        let logits = self.model.forward(&enc.input_ids, &enc.attention_mask, &enc.token_type_ids)?;
        let logit = logits.to_device(&Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?.first().copied().unwrap_or_default();
        Ok(sigmoid(logit))
    }
}

impl Reranker for CrossEncoderReranker {
    fn model_id(&self) -> &str { &self.id }
    fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        texts.iter().map(|t| self.score_pair(query, t)).collect()
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Fraction of distinct query terms that occur in the candidate text.
pub struct LexicalReranker;

impl LexicalReranker {
    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl Reranker for LexicalReranker {
    fn model_id(&self) -> &str { "lexical" }
    fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let query_terms = Self::terms(query);
        if query_terms.is_empty() {
            return Ok(vec![0.0; texts.len()]);
        }
        Ok(texts
            .iter()
            .map(|t| {
                let doc_terms = Self::terms(t);
                query_terms.iter().filter(|q| doc_terms.contains(*q)).count() as f32 / query_terms.len() as f32
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_centered() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(5.0) > 0.99);
    }

    #[test]
    fn lexical_prefers_overlap() {
        let texts = vec!["the cat sat on the mat".to_string(), "dogs bark loudly".to_string()];
        let scores = LexicalReranker.score("where did the cat sit", &texts).unwrap();
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }
}
