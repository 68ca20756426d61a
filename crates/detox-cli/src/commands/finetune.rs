//! `detox finetune`: supervised fine-tuning on labeled CSV data.
//!
//! ```text
//! detox finetune \
//!   --model   bert-base-uncased \
//!   --data    ./normalized.csv \
//!   --output  ./fine_tuned_model
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use detox_core::{seed_device, select_device, Label, TextDataset, Tokenizer};
use detox_distill::{distiller::format_duration, FineTuneConfig, FineTuner, Student};

use crate::commands::resolve_model;
use crate::config::AppConfig;

/// Command-line options; `None` falls back to the `[training]` config section.
#[derive(Debug)]
pub struct FinetuneArgs {
    pub model: String,
    pub data: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub train_fraction: f64,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub weight_decay: Option<f64>,
    pub max_seq_len: Option<usize>,
    pub seed: Option<u64>,
    pub gpu: bool,
}

impl FinetuneArgs {
    fn finetune_config(&self, base: &FineTuneConfig) -> FineTuneConfig {
        FineTuneConfig {
            epochs: self.epochs.unwrap_or(base.epochs),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            weight_decay: self.weight_decay.unwrap_or(base.weight_decay),
            max_seq_len: self.max_seq_len.unwrap_or(base.max_seq_len),
            seed: self.seed.unwrap_or(base.seed),
            output_dir: self.output.clone().unwrap_or_else(|| base.output_dir.clone()),
        }
    }
}

pub async fn run(args: FinetuneArgs, config: &AppConfig) -> Result<()> {
    let ft_config = args.finetune_config(&config.training);
    ft_config.validate()?;

    let mut dataset = TextDataset::default();
    for path in &args.data {
        let part = TextDataset::from_csv(path)
            .with_context(|| format!("Failed to load labeled data from {}", path.display()))?;
        info!(path = %path.display(), rows = part.len(), "Loaded labeled CSV");
        dataset.extend(part);
    }
    info!(
        rows = dataset.len(),
        toxic = dataset.count(Label::Toxic),
        non_toxic = dataset.count(Label::NonToxic),
        "Dataset ready"
    );

    let (train, val) = dataset.split(args.train_fraction, ft_config.seed)?;
    info!(train = train.len(), validation = val.len(), "Split dataset");

    let model_dir = resolve_model(&args.model, config).await?;
    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .with_context(|| format!("Failed to load {}", tokenizer_path.display()))?;

    let device = select_device(args.gpu || config.device.prefer_gpu, config.device.cuda_device_id)?;
    seed_device(&device, ft_config.seed)?;

    let mut model = Student::from_pretrained(&model_dir, Some(Label::id2label().len()), &device)?;
    info!(kind = model.kind(), model_dir = %model_dir.display(), "Model loaded for fine-tuning");

    let report = FineTuner::new(ft_config).run(&mut model, &tokenizer, &train, &val)?;

    println!();
    for epoch in &report.epochs {
        println!("{epoch}");
    }
    println!(
        "\nFine-tuning complete!\n\
         Best epoch: {} (f1 {:.4})\n\
         Checkpoint: {}\n\
         Elapsed: {}",
        report.best_epoch,
        report.best_f1,
        report.output_dir.display(),
        format_duration(report.elapsed_secs as u64),
    );

    Ok(())
}
