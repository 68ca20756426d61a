//! `detox distill`: distil a teacher classifier into a smaller student.
//!
//! Models that are not already cached are downloaded from Hugging Face
//! before training starts.
//!
//! ```text
//! detox distill \
//!   --teacher  unitary/toxic-bert \
//!   --samples  ./unlabeled.txt \
//!   --output   ./output/detox-lstm \
//!   --preset   small
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use detox_core::{seed_device, select_device, Classifier};
use detox_distill::{
    distiller::format_duration, export_student, load_samples, train, DistillConfig, Student, StudentPreset,
    Teacher,
};

use crate::commands::resolve_model;
use crate::config::AppConfig;

/// Command-line options; `None` falls back to the `[distill]` config section.
#[derive(Debug)]
pub struct DistillArgs {
    pub teacher: String,
    pub samples: PathBuf,
    pub output: PathBuf,
    pub preset: Option<String>,
    pub student_base: Option<String>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub max_seq_len: Option<usize>,
    pub seed: Option<u64>,
    pub gpu: bool,
    pub name: Option<String>,
}

impl DistillArgs {
    fn distill_config(&self, base: &DistillConfig) -> DistillConfig {
        DistillConfig {
            epochs: self.epochs.unwrap_or(base.epochs),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_seq_len: self.max_seq_len.unwrap_or(base.max_seq_len),
            seed: self.seed.unwrap_or(base.seed),
            shuffle: base.shuffle,
        }
    }
}

enum StudentSource {
    Preset(StudentPreset),
    Base(PathBuf),
}

pub async fn run(args: DistillArgs, config: &AppConfig) -> Result<()> {
    let distill_config = args.distill_config(&config.distill);
    distill_config.validate()?;

    let source = match (&args.preset, &args.student_base) {
        (Some(p), _) => StudentSource::Preset(StudentPreset::parse(p)?),
        (None, Some(base)) => StudentSource::Base(resolve_model(base, config).await?),
        (None, None) => {
            info!("No --preset or --student-base given, using the small preset");
            StudentSource::Preset(StudentPreset::Small)
        }
    };
    let teacher_dir = resolve_model(&args.teacher, config).await?;

    info!(path = %args.samples.display(), "Loading samples");
    let samples = load_samples(&args.samples)
        .with_context(|| format!("Failed to load samples from {}", args.samples.display()))?;
    info!(samples = samples.len(), "Samples ready");

    let device = select_device(args.gpu || config.device.prefer_gpu, config.device.cuda_device_id)?;
    seed_device(&device, distill_config.seed)?;

    let teacher = Teacher::load(&teacher_dir, &device)?;

    let mut student = match &source {
        StudentSource::Preset(p) => Student::from_preset(*p, teacher.tokenizer(), teacher.num_labels(), &device)?,
        StudentSource::Base(dir) => {
            info!(base = %dir.display(), "Loading student base model");
            let student = Student::from_pretrained(dir, Some(teacher.num_labels()), &device)?;
            student.check_vocab(teacher.tokenizer())?;
            student
        }
    };

    let stats = train(&teacher, &mut student, teacher.tokenizer(), &samples, &distill_config)?;

    info!(
        steps = stats.total_steps,
        loss = stats.final_loss,
        elapsed = format!("{:.1}s", stats.elapsed_secs),
        samples_per_sec = format!("{:.1}", stats.samples_per_sec),
        "Distillation complete"
    );

    let written = export_student(&student, teacher.model_dir(), &args.output, args.name.as_deref())?;

    println!(
        "\nDistillation complete!\n\
         Student: {} ({} files)\n\
         Output: {}\n\
         Final loss: {:.4}\n\
         Elapsed: {}\n\
         \n\
         Score texts with:\n  detox score --model {} \"some text\"",
        student.kind(),
        written.len(),
        args.output.display(),
        stats.final_loss,
        format_duration(stats.elapsed_secs as u64),
        args.output.display(),
    );

    Ok(())
}
