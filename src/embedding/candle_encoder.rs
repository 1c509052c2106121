//! Candle-based BERT text encoder.
//!
//! Runs sentence-transformer models locally through the Candle framework,
//! so reference and query embeddings need no external API. Only compiled
//! with the `embeddings-candle` feature.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::ApiBuilder;
use tokenizers::Tokenizer;

use crate::error::{KestrelError, Result};

use super::encoder::TextEncoder;

/// The model the reference deployments use; 384-dimension output.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// BERT encoder over Candle with mean pooling and L2 normalization.
pub struct CandleTextEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl CandleTextEncoder {
    /// Load a sentence-transformer model from the HuggingFace Hub cache,
    /// downloading it on first use.
    pub fn new(model_name: &str) -> Result<Self> {
        let device = Device::cuda_if_available(0)
            .map_err(|e| KestrelError::encoder(format!("device setup failed: {e}")))?;

        let cache_dir = std::env::var("HF_HOME")
            .or_else(|_| std::env::var("HOME").map(|home| format!("{home}/.cache/huggingface")))
            .unwrap_or_else(|_| "/tmp/huggingface".to_string());

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.into())
            .build()
            .map_err(|e| KestrelError::encoder(format!("hub api init failed: {e}")))?;
        let repo = api.model(model_name.to_string());

        let config_path = repo
            .get("config.json")
            .map_err(|e| KestrelError::encoder(format!("config download failed: {e}")))?;
        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(config_path)
                .map_err(|e| KestrelError::encoder(format!("config read failed: {e}")))?,
        )
        .map_err(|e| KestrelError::encoder(format!("config parse failed: {e}")))?;

        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| KestrelError::encoder(format!("weights download failed: {e}")))?;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| KestrelError::encoder(format!("weights load failed: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| KestrelError::encoder(format!("model load failed: {e}")))?;

        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| KestrelError::encoder(format!("tokenizer download failed: {e}")))?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| KestrelError::encoder(format!("tokenizer load failed: {e}")))?;

        let dimension = config.hidden_size;
        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    fn tensor_err(e: impl std::fmt::Display) -> KestrelError {
        KestrelError::encoder(e.to_string())
    }

    /// Mean pooling over token embeddings, ignoring padding via the
    /// attention mask.
    fn mean_pool(&self, embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = attention_mask
            .unsqueeze(2)
            .map_err(Self::tensor_err)?
            .expand(embeddings.shape())
            .map_err(Self::tensor_err)?
            .to_dtype(embeddings.dtype())
            .map_err(Self::tensor_err)?;

        let summed = embeddings
            .mul(&mask)
            .map_err(Self::tensor_err)?
            .sum(1)
            .map_err(Self::tensor_err)?;
        let counts = mask.sum(1).map_err(Self::tensor_err)?;
        summed.div(&counts).map_err(Self::tensor_err)
    }
}

#[async_trait]
impl TextEncoder for CandleTextEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| KestrelError::encoder(format!("tokenization failed: {e}")))?;

        let token_ids = Tensor::new(encoding.get_ids(), &self.device)
            .map_err(Self::tensor_err)?
            .unsqueeze(0)
            .map_err(Self::tensor_err)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)
            .map_err(Self::tensor_err)?
            .unsqueeze(0)
            .map_err(Self::tensor_err)?;

        let embeddings = self
            .model
            .forward(&token_ids, &attention_mask, None)
            .map_err(|e| KestrelError::encoder(format!("model forward failed: {e}")))?;

        let pooled = self.mean_pool(&embeddings, &attention_mask)?;
        let vector: Vec<f32> = pooled
            .squeeze(0)
            .map_err(Self::tensor_err)?
            .to_vec1()
            .map_err(Self::tensor_err)?;
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "candle_bert"
    }
}
