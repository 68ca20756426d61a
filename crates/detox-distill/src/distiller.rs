//! Teacher–student distillation loop.
//!
//! For every batch of unlabeled texts:
//!
//! 1. Tokenize to a fixed length (truncate + right-pad).
//! 2. Teacher logits, detached from any graph.
//! 3. Student logits, tracked for gradients.
//! 4. [`distillation_loss`] at the configured temperature.
//! 5. Backward pass and one Adam step over the student's `Var`s only.
//!
//! Everything is validated before the first forward pass, so a rejected run
//! leaves the student exactly as it was.

use std::time::Instant;

use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use detox_core::{Classifier, FixedLengthEncoder, Tokenizer, TrainableClassifier};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ComputeContext, DistillError, DistillResult};
use crate::loss::distillation_loss;

// ── Config ────────────────────────────────────────────────────────────────────

/// Hyper-parameters for a distillation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    /// Number of full passes over the samples.
    pub epochs: usize,
    /// Number of texts per batch.
    pub batch_size: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Softening temperature applied to both logit vectors.
    pub temperature: f64,
    /// Fixed token length every text is truncated / padded to.
    pub max_seq_len: usize,
    /// Seed for the per-epoch shuffle.
    pub seed: u64,
    /// Reshuffle the samples at the start of every epoch.
    pub shuffle: bool,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 4,
            learning_rate: 1e-5,
            temperature: 2.0,
            max_seq_len: 128,
            seed: 42,
            shuffle: true,
        }
    }
}

impl DistillConfig {
    /// Reject hyper-parameters that would make the run meaningless.
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
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(DistillError::config(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DistillError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

// ── Training statistics ───────────────────────────────────────────────────────

/// Summary returned after training completes.
#[derive(Debug, Clone)]
pub struct TrainingStats {
    pub total_steps: usize,
    /// Mean batch loss of every epoch, in order.
    pub epoch_losses: Vec<f32>,
    /// Loss of the last batch.
    pub final_loss: f32,
    pub elapsed_secs: f64,
    pub samples_per_sec: f64,
}

// ── Training loop ─────────────────────────────────────────────────────────────

/// Distil `teacher` into `student` over `samples`.
///
/// Only the student's parameters change.  Errors before the first step are
/// [`DistillError::Configuration`]; failures inside the loop are
/// [`DistillError::Computation`] and abort the run.
pub fn train<T, S>(
    teacher: &T,
    student: &mut S,
    tokenizer: &Tokenizer,
    samples: &[String],
    config: &DistillConfig,
) -> DistillResult<TrainingStats>
where
    T: Classifier + ?Sized,
    S: TrainableClassifier + ?Sized,
{
    config.validate()?;
    if samples.is_empty() {
        return Err(DistillError::config("no samples to distil on"));
    }
    if teacher.num_labels() < 2 {
        // Softmax over one class is constant, so the loss and every gradient are 0.
        return Err(DistillError::config(format!(
            "teacher has {} output logit(s); distillation needs at least 2 classes",
            teacher.num_labels()
        )));
    }
    if teacher.num_labels() != student.num_labels() {
        return Err(DistillError::config(format!(
            "teacher has {} labels but student has {}",
            teacher.num_labels(),
            student.num_labels()
        )));
    }

    let vars = student.trainable_vars();
    if vars.is_empty() {
        return Err(DistillError::config("student has no trainable parameters"));
    }

    let encoder = tokenizer
        .fixed_length(config.max_seq_len)
        .map_err(|e| DistillError::config(e.to_string()))?;

    let params = ParamsAdamW { lr: config.learning_rate, weight_decay: 0.0, ..Default::default() };
    let mut optimizer = AdamW::new(vars, params).computing("creating the optimiser")?;

    let batches_per_epoch = samples.len().div_ceil(config.batch_size);
    let total_steps = batches_per_epoch * config.epochs;

    info!(
        samples = samples.len(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        lr = config.learning_rate,
        temperature = config.temperature,
        "Distillation started"
    );

    let pb = progress_bar(total_steps as u64, "Distilling");
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..samples.len()).collect();

    let mut step = 0usize;
    let mut last_loss = 0.0f32;
    let mut epoch_losses = Vec::with_capacity(config.epochs);
    let start = Instant::now();

    for epoch in 0..config.epochs {
        if config.shuffle {
            order.shuffle(&mut rng);
        }

        let mut loss_sum = 0.0f64;
        let mut batches = 0usize;

        for chunk in order.chunks(config.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|&i| samples[i].as_str()).collect();

            last_loss = distill_step(teacher, student, &encoder, &mut optimizer, &texts, config.temperature)?;
            loss_sum += last_loss as f64;
            batches += 1;
            step += 1;

            debug!(epoch = epoch + 1, step, loss = last_loss, "Step");
            pb.set_message(format!("epoch {}/{} loss {:.4}", epoch + 1, config.epochs, last_loss));
            pb.inc(1);
        }

        let mean = (loss_sum / batches.max(1) as f64) as f32;
        epoch_losses.push(mean);
        info!(epoch = epoch + 1, loss = mean, "Epoch complete");
    }

    pb.finish_with_message(format!("Distillation complete, final loss {last_loss:.4}"));

    let elapsed = start.elapsed().as_secs_f64();
    let seen = (samples.len() * config.epochs) as f64;
    let samples_per_sec = if elapsed > 0.0 { seen / elapsed } else { 0.0 };

    Ok(TrainingStats { total_steps: step, epoch_losses, final_loss: last_loss, elapsed_secs: elapsed, samples_per_sec })
}

/// One optimisation step.  Returns the loss measured before the update.
fn distill_step<T, S>(
    teacher: &T,
    student: &S,
    encoder: &FixedLengthEncoder,
    optimizer: &mut AdamW,
    texts: &[&str],
    temperature: f64,
) -> DistillResult<f32>
where
    T: Classifier + ?Sized,
    S: TrainableClassifier + ?Sized,
{
    let batch = encoder.encode_batch(texts, None).computing("tokenizing a batch")?;

    let student_inputs = batch.to_tensors(student.device()).computing("building student inputs")?;
    let teacher_inputs = if teacher.device().same_device(student.device()) {
        student_inputs.clone()
    } else {
        batch.to_tensors(teacher.device()).computing("building teacher inputs")?
    };

    let teacher_logits = teacher
        .logits(&teacher_inputs)
        .computing("computing teacher logits")?
        .detach()
        .to_device(student.device())
        .computing("moving teacher logits")?;

    let student_logits = student.logits(&student_inputs).computing("computing student logits")?;

    let loss = distillation_loss(&student_logits, &teacher_logits, temperature)
        .computing("computing the distillation loss")?;
    let value = loss.to_scalar::<f32>().computing("reading the loss")?;

    optimizer.backward_step(&loss).computing("backward / optimiser step")?;
    Ok(value)
}

// ── Distiller ─────────────────────────────────────────────────────────────────

/// Owns a teacher, a student and the tokenizer they share.
pub struct Distiller<T, S> {
    teacher: T,
    student: S,
    tokenizer: Tokenizer,
    config: DistillConfig,
}

impl<T: Classifier, S: TrainableClassifier> Distiller<T, S> {
    pub fn new(teacher: T, student: S, tokenizer: Tokenizer, config: DistillConfig) -> Self {
        Self { teacher, student, tokenizer, config }
    }

    /// Train the student on `samples`; see [`train`].
    pub fn run(&mut self, samples: &[String]) -> DistillResult<TrainingStats> {
        train(&self.teacher, &mut self.student, &self.tokenizer, samples, &self.config)
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    pub fn teacher(&self) -> &T {
        &self.teacher
    }

    pub fn student(&self) -> &S {
        &self.student
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Consume the `Distiller` and return the trained student.
    pub fn into_student(self) -> S {
        self.student
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub(crate) fn progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

/// `90` → `"1m 30s"`.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DistillConfig::default();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.learning_rate, 1e-5);
        assert_eq!(c.epochs, 3);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn invalid_hyper_parameters_are_rejected() {
        let bad = [
            DistillConfig { epochs: 0, ..Default::default() },
            DistillConfig { batch_size: 0, ..Default::default() },
            DistillConfig { max_seq_len: 0, ..Default::default() },
            DistillConfig { temperature: 0.0, ..Default::default() },
            DistillConfig { temperature: -1.0, ..Default::default() },
            DistillConfig { learning_rate: 0.0, ..Default::default() },
            DistillConfig { learning_rate: f64::INFINITY, ..Default::default() },
        ];
        for c in bad {
            assert!(matches!(c.validate(), Err(DistillError::Configuration(_))), "{c:?}");
        }
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3725), "1h 02m 05s");
    }

    #[test]
    fn partial_config_deserialises_with_defaults() {
        let c: DistillConfig = serde_json::from_str(r#"{"temperature": 4.0}"#).unwrap();
        assert_eq!(c.temperature, 4.0);
        assert_eq!(c.batch_size, 4);
    }
}
