//! `detox score`: toxicity scores from a trained classifier.
//!
//! Texts given on the command line are scored in one batch.  Without texts,
//! an interactive loop reads one text per line from stdin until EOF or
//! `exit`.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use detox_core::{load_classifier, scores_from_logits, select_device, Classifier, FixedLengthEncoder, Tokenizer};

use crate::commands::resolve_model;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct ScoredText<'a> {
    text: &'a str,
    label: &'a str,
    score: f32,
}

pub async fn run(
    model: &str,
    texts: &[String],
    max_seq_len: usize,
    json: bool,
    prefer_gpu: bool,
    config: &AppConfig,
) -> Result<()> {
    let model_dir = resolve_model(model, config).await?;
    let device = select_device(prefer_gpu || config.device.prefer_gpu, config.device.cuda_device_id)?;

    let classifier = load_classifier(&model_dir, &device)
        .with_context(|| format!("Failed to load classifier from {}", model_dir.display()))?;
    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .with_context(|| format!("Failed to load {}", tokenizer_path.display()))?;
    let encoder = tokenizer.fixed_length(max_seq_len)?;

    info!(
        model_dir = %model_dir.display(),
        num_labels = classifier.num_labels(),
        "Classifier ready"
    );

    if !texts.is_empty() {
        let lines = score_texts(classifier.as_ref(), &encoder, texts, json)?;
        for line in lines {
            println!("{line}");
        }
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }
        for out in score_texts(classifier.as_ref(), &encoder, &[text.to_string()], json)? {
            println!("{out}");
        }
    }
    Ok(())
}

/// Score `texts` and format one output line per text.
fn score_texts(
    classifier: &dyn Classifier,
    encoder: &FixedLengthEncoder,
    texts: &[String],
    json: bool,
) -> Result<Vec<String>> {
    let batch = encoder.encode_batch(texts, None)?;
    let tensors = batch.to_tensors(classifier.device())?;
    let logits = classifier.logits(&tensors)?;
    let scores = scores_from_logits(&logits, &classifier.id2label())?;

    texts
        .iter()
        .zip(&scores)
        .map(|(text, s)| {
            if json {
                let row = ScoredText { text, label: &s.label, score: s.score };
                Ok(serde_json::to_string(&row)?)
            } else {
                Ok(format!("{:<10} {:>7.4}  {}", s.label, s.score, text))
            }
        })
        .collect()
}
