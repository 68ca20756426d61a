use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use config::load_config;

/// detox: train, distil and score toxicity classifiers
#[derive(Debug, Parser)]
#[command(name = "detox", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, global = true, default_value = "pretty", value_name = "FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a classifier from Hugging Face Hub.
    Pull {
        /// Hugging Face model id, optionally with `@revision`
        /// (e.g. `unitary/toxic-bert`).
        model_id: String,

        /// Git revision, branch, or commit hash.
        #[arg(long, default_value = "main")]
        revision: String,
    },

    /// List models stored in the local cache.
    List {
        /// Re-hash every cached file against its recorded SHA-256.
        #[arg(long)]
        verify: bool,
    },

    /// Delete a cached model from local storage.
    Delete {
        /// Model id to delete (e.g. `unitary/toxic-bert`).
        model_id: String,

        /// Revision to delete. Omit to delete all revisions.
        #[arg(long, short = 'r')]
        revision: Option<String>,
    },

    /// Distil a large teacher classifier into a small student.
    ///
    /// The student is either a fresh LSTM sized by --preset, or an existing
    /// model given by --student-base.  With neither, the `small` preset is
    /// used.
    Distill {
        /// Teacher classifier: local directory or HF repo id.
        #[arg(long, short = 't')]
        teacher: String,

        /// Unlabeled texts: a .txt / .jsonl / .csv file or a directory of them.
        #[arg(long, short = 's')]
        samples: PathBuf,

        /// Output directory for the distilled student.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Student size preset: small, base or large.
        #[arg(long, conflicts_with = "student_base")]
        preset: Option<String>,

        /// Existing model to start the student from: local directory or HF
        /// repo id.
        #[arg(long)]
        student_base: Option<String>,

        /// Number of training epochs.
        #[arg(long)]
        epochs: Option<usize>,

        /// Texts per batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Adam learning rate.
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Softening temperature (> 0).
        #[arg(long)]
        temperature: Option<f64>,

        /// Fixed token length every text is truncated / padded to.
        #[arg(long)]
        max_seq_len: Option<usize>,

        /// Seed for shuffling and device RNG.
        #[arg(long)]
        seed: Option<u64>,

        /// Prefer GPU acceleration (CUDA/Metal).
        #[arg(long)]
        gpu: bool,

        /// Name recorded in labels.json.  Also sets the output directory to
        /// ./output/<name> when --output is omitted.
        #[arg(long)]
        name: Option<String>,
    },

    /// Fine-tune a pretrained classifier on labeled CSV data.
    Finetune {
        /// Base model: local directory or HF repo id.
        #[arg(long, short = 'm')]
        model: String,

        /// Labeled CSV file(s) with `text` and `is_toxic` columns.
        #[arg(long, short = 'd', required = true, num_args = 1..)]
        data: Vec<PathBuf>,

        /// Checkpoint and metrics directory.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Share of rows used for training; the rest is validation.
        #[arg(long, default_value_t = 0.8)]
        train_fraction: f64,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        weight_decay: Option<f64>,

        #[arg(long)]
        max_seq_len: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Prefer GPU acceleration (CUDA/Metal).
        #[arg(long)]
        gpu: bool,
    },

    /// Score texts for toxicity.  Reads stdin interactively when no text is
    /// given.
    Score {
        /// Classifier: local directory or HF repo id.
        #[arg(long, short = 'm')]
        model: String,

        /// Texts to score.
        texts: Vec<String>,

        /// Token length texts are truncated / padded to.
        #[arg(long, default_value_t = 128)]
        max_seq_len: usize,

        /// Emit one JSON object per text instead of a table.
        #[arg(long)]
        json: bool,

        /// Prefer GPU acceleration (CUDA/Metal).
        #[arg(long)]
        gpu: bool,
    },

    /// Merge labeled CSV files into one normalised `text,is_toxic` CSV.
    Normalize {
        /// Input CSV files.
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Destination CSV.
        #[arg(long, short = 'o', default_value = "normalized.csv")]
        output: PathBuf,
    },

    /// Summarise a fine-tuning metrics log.
    Metrics {
        /// Path to metrics.txt (or the directory containing it).
        path: PathBuf,

        /// Print a single series: train_loss, train_acc, val_acc,
        /// precision, recall or f1.
        #[arg(long)]
        metric: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let cfg = load_config(cli.config.as_ref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Pull { model_id, revision } => {
            commands::pull::run(&model_id, &revision, &cfg).await?;
        }
        Commands::List { verify } => {
            commands::list::run(verify, &cfg)?;
        }
        Commands::Delete { model_id, revision } => {
            commands::delete::run(&model_id, revision.as_deref(), &cfg)?;
        }
        Commands::Distill {
            teacher,
            samples,
            output,
            preset,
            student_base,
            epochs,
            batch_size,
            learning_rate,
            temperature,
            max_seq_len,
            seed,
            gpu,
            name,
        } => {
            let output = output
                .or_else(|| name.as_deref().map(|n| PathBuf::from("output").join(n)))
                .unwrap_or_else(|| PathBuf::from("output").join("detox-student"));

            let args = commands::distill::DistillArgs {
                teacher,
                samples,
                output,
                preset,
                student_base,
                epochs,
                batch_size,
                learning_rate,
                temperature,
                max_seq_len,
                seed,
                gpu,
                name,
            };
            commands::distill::run(args, &cfg).await?;
        }
        Commands::Finetune {
            model,
            data,
            output,
            train_fraction,
            epochs,
            batch_size,
            learning_rate,
            weight_decay,
            max_seq_len,
            seed,
            gpu,
        } => {
            let args = commands::finetune::FinetuneArgs {
                model,
                data,
                output,
                train_fraction,
                epochs,
                batch_size,
                learning_rate,
                weight_decay,
                max_seq_len,
                seed,
                gpu,
            };
            commands::finetune::run(args, &cfg).await?;
        }
        Commands::Score { model, texts, max_seq_len, json, gpu } => {
            commands::score::run(&model, &texts, max_seq_len, json, gpu, &cfg).await?;
        }
        Commands::Normalize { inputs, output } => {
            commands::normalize::run(&inputs, &output)?;
        }
        Commands::Metrics { path, metric } => {
            commands::metrics::run(&path, metric.as_deref())?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(fmt::layer().json())
            .init();
    } else {
        registry
            .with(fmt::layer().pretty())
            .init();
    }
}
