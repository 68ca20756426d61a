//! Lightweight LSTM student classifier.
//!
//! embedding → single-layer LSTM → masked mean pooling → linear head.
//!
//! Saved as `student_config.json` plus `model.safetensors`.

use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::rnn::{LSTMConfig, LSTM, RNN};
use candle_nn::{embedding, linear, Embedding, Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::batch::BatchTensors;
use crate::classifier::{Classifier, TrainableClassifier};
use crate::error::{CoreError, CoreResult};

/// File name of the architecture config written next to the weights.
pub const STUDENT_CONFIG_FILE: &str = "student_config.json";

/// Architecture of an [`LstmClassifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LstmClassifierConfig {
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub num_labels: usize,
    #[serde(default)]
    pub pad_token_id: u32,
}

impl LstmClassifierConfig {
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("vocab_size", self.vocab_size),
            ("embed_dim", self.embed_dim),
            ("hidden_dim", self.hidden_dim),
            ("num_labels", self.num_labels),
        ] {
            if value == 0 {
                return Err(CoreError::config(field, "must be at least 1"));
            }
        }
        if self.pad_token_id as usize >= self.vocab_size {
            return Err(CoreError::config(
                "pad_token_id",
                format!("{} is outside the vocabulary ({})", self.pad_token_id, self.vocab_size),
            ));
        }
        Ok(())
    }

    /// Trainable parameter count.
    pub fn param_count(&self) -> usize {
        let emb = self.vocab_size * self.embed_dim;
        let lstm = 4 * self.hidden_dim * (self.embed_dim + self.hidden_dim) + 8 * self.hidden_dim;
        let head = self.hidden_dim * self.num_labels + self.num_labels;
        emb + lstm + head
    }
}

/// LSTM classifier whose parameters live in a [`VarMap`].
pub struct LstmClassifier {
    embedding: Embedding,
    lstm: LSTM,
    head: Linear,
    varmap: VarMap,
    config: LstmClassifierConfig,
    device: Device,
}

impl LstmClassifier {
    /// Fresh, randomly initialised classifier.
    pub fn new(config: LstmClassifierConfig, device: &Device) -> CoreResult<Self> {
        config.validate()?;
        let varmap = VarMap::new();
        let model = Self::build(varmap, config, device)?;
        info!(
            vocab_size = model.config.vocab_size,
            hidden_dim = model.config.hidden_dim,
            params = model.config.param_count(),
            "LSTM classifier initialised"
        );
        Ok(model)
    }

    /// Load a classifier saved with [`TrainableClassifier::save`].
    pub fn load(dir: &Path, device: &Device) -> CoreResult<Self> {
        let cfg_path = dir.join(STUDENT_CONFIG_FILE);
        let text = std::fs::read_to_string(&cfg_path).map_err(|e| {
            CoreError::config(STUDENT_CONFIG_FILE, format!("cannot read {}: {e}", cfg_path.display()))
        })?;
        let config: LstmClassifierConfig = serde_json::from_str(&text)?;
        config.validate()?;

        let mut model = Self::build(VarMap::new(), config, device)?;
        model.varmap.load(dir.join("model.safetensors"))?;
        info!(dir = %dir.display(), "LSTM classifier loaded");
        Ok(model)
    }

    fn build(varmap: VarMap, config: LstmClassifierConfig, device: &Device) -> CoreResult<Self> {
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let embedding = embedding(config.vocab_size, config.embed_dim, vb.pp("embedding"))?;
        let lstm = candle_nn::lstm(config.embed_dim, config.hidden_dim, LSTMConfig::default(), vb.pp("lstm"))?;
        let head = linear(config.hidden_dim, config.num_labels, vb.pp("classifier"))?;
        Ok(Self { embedding, lstm, head, varmap, config, device: device.clone() })
    }

    pub fn config(&self) -> &LstmClassifierConfig {
        &self.config
    }
}

impl Classifier for LstmClassifier {
    fn num_labels(&self) -> usize {
        self.config.num_labels
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        let x = self.embedding.forward(&batch.input_ids)?;
        let states = self.lstm.seq(&x)?;
        // [B, L, H]
        let hidden = self.lstm.states_to_tensor(&states)?;

        let mask = batch.attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        // All-padding rows pool to zero instead of dividing by zero.
        let counts = mask.sum(1)?.maximum(1.0)?;
        let pooled = summed.broadcast_div(&counts)?;

        Ok(self.head.forward(&pooled)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl TrainableClassifier for LstmClassifier {
    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn save(&self, dir: &Path) -> CoreResult<()> {
        std::fs::create_dir_all(dir)?;
        self.varmap.save(dir.join("model.safetensors"))?;
        std::fs::write(dir.join(STUDENT_CONFIG_FILE), serde_json::to_string_pretty(&self.config)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{EncodedBatch, Sample};

    fn config() -> LstmClassifierConfig {
        LstmClassifierConfig { vocab_size: 16, embed_dim: 8, hidden_dim: 6, num_labels: 2, pad_token_id: 0 }
    }

    fn batch() -> BatchTensors {
        let s = |ids: &[u32], mask: &[u32]| Sample {
            text: String::new(),
            input_ids: ids.to_vec(),
            attention_mask: mask.to_vec(),
        };
        EncodedBatch::new(vec![s(&[3, 4, 5, 0], &[1, 1, 1, 0]), s(&[0, 0, 0, 0], &[0, 0, 0, 0])], None)
            .unwrap()
            .to_tensors(&Device::Cpu)
            .unwrap()
    }

    #[test]
    fn logits_have_batch_by_labels_shape() {
        let model = LstmClassifier::new(config(), &Device::Cpu).unwrap();
        let logits = model.logits(&batch()).unwrap();
        assert_eq!(logits.dims(), &[2, 2]);
    }

    #[test]
    fn all_padding_row_stays_finite() {
        let model = LstmClassifier::new(config(), &Device::Cpu).unwrap();
        let logits = model.logits(&batch()).unwrap().to_vec2::<f32>().unwrap();
        assert!(logits[1].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut cfg = config();
        cfg.hidden_dim = 0;
        assert!(matches!(LstmClassifier::new(cfg, &Device::Cpu), Err(CoreError::Config { .. })));
    }

    #[test]
    fn save_then_load_gives_identical_logits() {
        let dir = tempfile::TempDir::new().unwrap();
        let model = LstmClassifier::new(config(), &Device::Cpu).unwrap();
        model.save(dir.path()).unwrap();
        assert!(dir.path().join(STUDENT_CONFIG_FILE).exists());

        let back = LstmClassifier::load(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(back.config(), model.config());
        let a = model.logits(&batch()).unwrap().to_vec2::<f32>().unwrap();
        let b = back.logits(&batch()).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn param_count_matches_varmap() {
        let model = LstmClassifier::new(config(), &Device::Cpu).unwrap();
        let total: usize = model.trainable_vars().iter().map(|v| v.elem_count()).sum();
        assert_eq!(total, config().param_count());
    }
}
