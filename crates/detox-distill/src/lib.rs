//! # detox-distill
//!
//! Training for detox toxicity classifiers.
//!
//! * **Distillation**: a frozen *teacher* classifier supervises a trainable
//!   *student* over unlabeled texts.  The student minimises the batch-mean
//!   KL divergence between the temperature-softened output distributions,
//!   scaled by `T²` (see [`loss`]).
//! * **Fine-tuning**: cross-entropy training on labeled CSV data with
//!   per-epoch validation metrics and best-F1 checkpointing (see
//!   [`finetune`]).
//!
//! ## Usage
//!
//! ```text
//! detox distill \
//!   --teacher   unitary/toxic-bert \
//!   --samples   ./unlabeled.txt \
//!   --output    ./output/detox-lstm \
//!   --preset    small
//! ```
//!
//! or, fine-tuning a pretrained encoder on labeled data:
//!
//! ```text
//! detox finetune \
//!   --model     bert-base-uncased \
//!   --data      ./normalized.csv \
//!   --output    ./fine_tuned_model
//! ```

pub mod dataset;
pub mod distiller;
pub mod error;
pub mod export;
pub mod finetune;
pub mod loss;
pub mod presets;
pub mod student;
pub mod teacher;

pub use dataset::load_samples;
pub use distiller::{train, DistillConfig, Distiller, TrainingStats};
pub use error::{DistillError, DistillResult};
pub use export::export_student;
pub use finetune::{FineTuneConfig, FineTuneReport, FineTuner};
pub use loss::{distillation_loss, kl_divergence_batchmean};
pub use presets::StudentPreset;
pub use student::Student;
pub use teacher::Teacher;
