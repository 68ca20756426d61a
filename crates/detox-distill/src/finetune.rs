//! Supervised fine-tuning on labeled texts.
//!
//! Cross-entropy against the gold labels with AdamW.  After every epoch the
//! model is evaluated on the validation set, the epoch line is appended to
//! `metrics.txt`, and the checkpoint in `output_dir` is replaced when the
//! validation F1 improves, so only the best epoch is kept on disk.

use std::path::PathBuf;
use std::time::Instant;

use candle_core::D;
use candle_nn::loss::cross_entropy;
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use detox_core::{
    Classifier, ConfusionCounts, EncodedBatch, EpochMetrics, FixedLengthEncoder, LabeledText, MetricsLog, TextDataset,
    Tokenizer, TrainableClassifier,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::distiller::progress_bar;
use crate::error::{ComputeContext, DistillError, DistillResult};

/// Name of the per-epoch metrics log written into the output directory.
pub const METRICS_FILE: &str = "metrics.txt";

/// Hyper-parameters for a fine-tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineTuneConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub max_seq_len: usize,
    pub seed: u64,
    /// Checkpoint and metrics destination.
    pub output_dir: PathBuf,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            epochs: 4,
            batch_size: 16,
            learning_rate: 5e-5,
            weight_decay: 0.01,
            max_seq_len: 128,
            seed: 42,
            output_dir: PathBuf::from("./fine_tuned_model"),
        }
    }
}

impl FineTuneConfig {
    pub fn validate(&self) -> DistillResult<()> {
        if self.epochs == 0 {
            return Err(DistillError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(DistillError::config("batch_size must be at least 1"));
        }
        if self.max_seq_len == 0 {
            return Err(DistillError::config("max_seq_len must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DistillError::config(format!("learning_rate must be positive, got {}", self.learning_rate)));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(DistillError::config(format!("weight_decay must be >= 0, got {}", self.weight_decay)));
        }
        Ok(())
    }
}

/// Outcome of a fine-tuning run.
#[derive(Debug, Clone)]
pub struct FineTuneReport {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch (1-based) whose checkpoint is in `output_dir`.
    pub best_epoch: usize,
    pub best_f1: f64,
    pub output_dir: PathBuf,
    pub elapsed_secs: f64,
}

/// Supervised trainer.
pub struct FineTuner {
    config: FineTuneConfig,
}

impl FineTuner {
    pub fn new(config: FineTuneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FineTuneConfig {
        &self.config
    }

    /// Fine-tune `model` on `train`, evaluating on `val` after every epoch.
    ///
    /// The tokenizer is saved next to the checkpoint so the output directory
    /// can be loaded on its own.
    pub fn run<M>(&self, model: &mut M, tokenizer: &Tokenizer, train: &TextDataset, val: &TextDataset) -> DistillResult<FineTuneReport>
    where
        M: TrainableClassifier + ?Sized,
    {
        let cfg = &self.config;
        cfg.validate()?;
        if train.is_empty() {
            return Err(DistillError::config("training set is empty"));
        }
        if model.num_labels() < 2 {
            return Err(DistillError::config("fine-tuning needs a classifier with at least 2 labels"));
        }
        if val.is_empty() {
            warn!("Validation set is empty; metrics are reported as 0 and the last epoch is kept");
        }

        let encoder = tokenizer.fixed_length(cfg.max_seq_len).map_err(|e| DistillError::config(e.to_string()))?;

        std::fs::create_dir_all(&cfg.output_dir).map_err(|e| DistillError::persistence(&cfg.output_dir, e))?;
        let metrics_path = cfg.output_dir.join(METRICS_FILE);
        let log = MetricsLog::create(&metrics_path).map_err(|e| DistillError::persistence(&metrics_path, e))?;
        tokenizer
            .save(&cfg.output_dir.join("tokenizer.json"))
            .map_err(|e| DistillError::persistence(cfg.output_dir.join("tokenizer.json"), e))?;

        let params = ParamsAdamW { lr: cfg.learning_rate, weight_decay: cfg.weight_decay, ..Default::default() };
        let mut optimizer = AdamW::new(model.trainable_vars(), params).computing("creating the optimiser")?;

        info!(
            train = train.len(),
            val = val.len(),
            epochs = cfg.epochs,
            batch_size = cfg.batch_size,
            lr = cfg.learning_rate,
            "Fine-tuning started"
        );

        let steps = train.len().div_ceil(cfg.batch_size) * cfg.epochs;
        let pb = progress_bar(steps as u64, "Fine-tuning");
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut records: Vec<&LabeledText> = train.as_slice().iter().collect();

        let mut history = Vec::with_capacity(cfg.epochs);
        let mut best: Option<(usize, f64)> = None;
        let start = Instant::now();

        for epoch in 1..=cfg.epochs {
            records.shuffle(&mut rng);

            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            let mut train_counts = ConfusionCounts::default();

            for chunk in records.chunks(cfg.batch_size) {
                let batch = encode(&encoder, chunk)?;
                let inputs = batch.to_tensors(model.device()).computing("building inputs")?;
                let labels = inputs.labels.as_ref().ok_or_else(|| DistillError::config("batch without labels"))?;

                let logits = model.logits(&inputs).computing("computing logits")?;
                let loss = cross_entropy(&logits, labels).computing("computing cross-entropy")?;
                let value = loss.to_scalar::<f32>().computing("reading the loss")?;

                let predicted = logits.argmax(D::Minus1).and_then(|t| t.to_vec1::<u32>()).computing("reading predictions")?;
                train_counts.merge(&ConfusionCounts::from_predictions(&predicted, batch.labels().unwrap_or_default()));

                optimizer.backward_step(&loss).computing("backward / optimiser step")?;

                loss_sum += value as f64;
                batches += 1;
                pb.set_message(format!("epoch {epoch}/{} loss {value:.4}", cfg.epochs));
                pb.inc(1);
            }

            let val_counts = evaluate(&*model, &encoder, val, cfg.batch_size)?;
            let metrics = EpochMetrics {
                epoch,
                train_loss: loss_sum / batches.max(1) as f64,
                train_acc: train_counts.accuracy(),
                val_acc: val_counts.accuracy(),
                precision: val_counts.precision(),
                recall: val_counts.recall(),
                f1: val_counts.f1(),
            };
            log.append(&metrics).map_err(|e| DistillError::persistence(&metrics_path, e))?;
            info!(
                epoch,
                train_loss = metrics.train_loss,
                val_acc = metrics.val_acc,
                f1 = metrics.f1,
                "Epoch complete"
            );

            let improved = match best {
                None => true,
                Some((_, best_f1)) => metrics.f1 > best_f1 || val.is_empty(),
            };
            if improved {
                model.save(&cfg.output_dir).map_err(|e| DistillError::persistence(&cfg.output_dir, e))?;
                info!(epoch, f1 = metrics.f1, dir = %cfg.output_dir.display(), "Checkpoint saved");
                best = Some((epoch, metrics.f1));
            }
            history.push(metrics);
        }

        pb.finish_with_message("Fine-tuning complete");
        let (best_epoch, best_f1) = best.unwrap_or((cfg.epochs, 0.0));

        Ok(FineTuneReport {
            epochs: history,
            best_epoch,
            best_f1,
            output_dir: cfg.output_dir.clone(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }
}

/// Confusion counts of `model` over `data`, without touching any gradient.
pub fn evaluate<M>(model: &M, encoder: &FixedLengthEncoder, data: &TextDataset, batch_size: usize) -> DistillResult<ConfusionCounts>
where
    M: Classifier + ?Sized,
{
    let mut counts = ConfusionCounts::default();
    let records: Vec<&LabeledText> = data.as_slice().iter().collect();
    for chunk in records.chunks(batch_size.max(1)) {
        let batch = encode(encoder, chunk)?;
        let inputs = batch.to_tensors(model.device()).computing("building evaluation inputs")?;
        let predicted = model
            .logits(&inputs)
            .computing("computing evaluation logits")?
            .detach()
            .argmax(D::Minus1)
            .and_then(|t| t.to_vec1::<u32>())
            .computing("reading predictions")?;
        counts.merge(&ConfusionCounts::from_predictions(&predicted, batch.labels().unwrap_or_default()));
    }
    Ok(counts)
}

fn encode(encoder: &FixedLengthEncoder, chunk: &[&LabeledText]) -> DistillResult<EncodedBatch> {
    let texts: Vec<&str> = chunk.iter().map(|r| r.text.as_str()).collect();
    let labels: Vec<u32> = chunk.iter().map(|r| r.label.class_id()).collect();
    encoder.encode_batch(&texts, Some(labels)).computing("tokenizing a batch")
}
