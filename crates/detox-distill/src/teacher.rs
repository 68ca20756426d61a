//! Frozen teacher classifier.
//!
//! Wraps a [`BertClassifier`] loaded from memory-mapped safetensors together
//! with the tokenizer shipped in the same directory.  The teacher is only
//! ever used for inference: its weights are plain tensors (never `Var`s) and
//! its logits are detached before they reach the loss.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use detox_core::{BatchTensors, BertClassifier, Classifier, CoreResult, Tokenizer};
use tracing::info;

use crate::error::{DistillError, DistillResult};

pub struct Teacher {
    model: BertClassifier,
    tokenizer: Tokenizer,
    model_dir: PathBuf,
}

impl Teacher {
    /// Load the teacher classifier and its `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path, device: &Device) -> DistillResult<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(DistillError::config(format!(
                "teacher directory {} has no tokenizer.json",
                model_dir.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(DistillError::Dataset)?;

        let model = BertClassifier::load_frozen(model_dir, device)
            .map_err(|e| DistillError::computation(format!("loading teacher from {}", model_dir.display()), e))?;

        info!(
            model_dir = %model_dir.display(),
            arch = ?model.architecture(),
            num_labels = model.num_labels(),
            vocab_size = tokenizer.vocab_size(),
            "Teacher loaded"
        );

        Ok(Self { model, tokenizer, model_dir: model_dir.to_path_buf() })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl Classifier for Teacher {
    fn num_labels(&self) -> usize {
        self.model.num_labels()
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        Ok(self.model.logits(batch)?.detach())
    }

    fn device(&self) -> &Device {
        self.model.device()
    }

    fn id2label(&self) -> Vec<String> {
        self.model.id2label()
    }
}
