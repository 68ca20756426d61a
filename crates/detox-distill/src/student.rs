//! Trainable student classifier.
//!
//! ## Construction modes
//!
//! * **`from_preset`**: a fresh [`LstmClassifier`] sized by a
//!   [`StudentPreset`], reading the teacher tokenizer's ids.
//! * **`from_pretrained`**: an existing model directory, either a previously
//!   exported LSTM student (`student_config.json`) or a BERT-family
//!   checkpoint loaded into a `VarMap` for fine-tuning.

use std::path::Path;

use candle_core::{Device, Tensor, Var};
use detox_core::lstm::STUDENT_CONFIG_FILE;
use detox_core::{BatchTensors, BertClassifier, Classifier, CoreResult, LstmClassifier, Tokenizer, TrainableClassifier};
use tracing::info;

use crate::error::{DistillError, DistillResult};
use crate::presets::StudentPreset;

/// A student whose parameters live in a `VarMap`.
pub enum Student {
    Lstm(LstmClassifier),
    Bert(BertClassifier),
}

impl Student {
    /// Fresh LSTM student with random weights.
    pub fn from_preset(
        preset: StudentPreset,
        tokenizer: &Tokenizer,
        num_labels: usize,
        device: &Device,
    ) -> DistillResult<Self> {
        let config = preset.lstm_config(tokenizer.vocab_size(), tokenizer.pad_token_id(), num_labels);
        info!(
            preset = preset.label(),
            params = config.param_count(),
            vocab_size = config.vocab_size,
            "Initialising student from size preset (random weights)"
        );
        let model = LstmClassifier::new(config, device).map_err(|e| DistillError::config(e.to_string()))?;
        Ok(Self::Lstm(model))
    }

    /// Load a student base model from `model_dir`.
    ///
    /// `num_labels` resizes a BERT classification head; it must match a saved
    /// LSTM student's label count.
    pub fn from_pretrained(model_dir: &Path, num_labels: Option<usize>, device: &Device) -> DistillResult<Self> {
        let context = || format!("loading student from {}", model_dir.display());

        if model_dir.join(STUDENT_CONFIG_FILE).exists() {
            let model = LstmClassifier::load(model_dir, device).map_err(|e| DistillError::computation(context(), e))?;
            if let Some(n) = num_labels.filter(|&n| n != model.num_labels()) {
                return Err(DistillError::config(format!(
                    "saved LSTM student has {} labels, {n} requested",
                    model.num_labels()
                )));
            }
            return Ok(Self::Lstm(model));
        }

        let model = BertClassifier::load_trainable(model_dir, num_labels, device)
            .map_err(|e| DistillError::computation(context(), e))?;
        Ok(Self::Bert(model))
    }

    /// Rows of the student's word embedding table.
    pub fn vocab_size(&self) -> usize {
        match self {
            Self::Lstm(m) => m.config().vocab_size,
            Self::Bert(m) => m.vocab_size(),
        }
    }

    /// Reject a student that cannot embed every id `tokenizer` produces.
    pub fn check_vocab(&self, tokenizer: &Tokenizer) -> DistillResult<()> {
        let needed = tokenizer.vocab_size();
        if self.vocab_size() < needed {
            return Err(DistillError::config(format!(
                "{} student embeds {} token ids but the teacher tokenizer produces up to {needed}",
                self.kind(),
                self.vocab_size()
            )));
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lstm(_) => "lstm",
            Self::Bert(_) => "bert",
        }
    }

    fn inner(&self) -> &dyn TrainableClassifier {
        match self {
            Self::Lstm(m) => m,
            Self::Bert(m) => m,
        }
    }
}

impl Classifier for Student {
    fn num_labels(&self) -> usize {
        self.inner().num_labels()
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        self.inner().logits(batch)
    }

    fn device(&self) -> &Device {
        self.inner().device()
    }

    fn id2label(&self) -> Vec<String> {
        self.inner().id2label()
    }
}

impl TrainableClassifier for Student {
    fn trainable_vars(&self) -> Vec<Var> {
        self.inner().trainable_vars()
    }

    fn save(&self, dir: &Path) -> CoreResult<()> {
        self.inner().save(dir)
    }
}
