use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ragkit_core::model::{LocalEmbedModel, Pooling};
use ragkit_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::pool;
use crate::tokenize::{load_tokenizer, tokenize_on_device};

/// BGE sentence embedder (BERT encoder) run locally with candle.
pub struct BgeEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    pooling: Pooling,
}

impl BgeEmbedder {
    pub fn load(spec: LocalEmbedModel, model_dir: &Path, pooling: Pooling) -> Result<Self> {
        let device = select_device();
        info!(model = spec.repo(), dir = %model_dir.display(), "loading embedding model");
        let tokenizer = load_tokenizer(&model_dir.join("tokenizer.json"), spec.max_len())?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        Ok(Self {
            model,
            tokenizer,
            device,
            id: format!("local:{}", spec.repo()),
            dim: spec.dim(),
            max_len: spec.max_len(),
            pooling,
        })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let enc = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&enc.input_ids, &enc.token_type_ids, Some(&enc.attention_mask))?;
        let pooled = pool(&hidden, &enc.attention_mask, self.pooling)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim {
            return Err(anyhow!("dim mismatch: got {} expected {}", emb.len(), self.dim));
        }
        if start.elapsed().as_millis() > 100 {
            debug!(ms = start.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(emb)
    }
}

impl Embedder for BgeEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// `model.safetensors` when present, otherwise `pytorch_model.bin`.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}
