use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use detox_core::metrics::read_metrics_file;
use detox_core::{EpochMetrics, Metric};
use detox_distill::finetune::METRICS_FILE;

/// Print a metrics log as a table, or a single metric series with its best
/// epoch.
pub fn run(path: &Path, metric: Option<&str>) -> Result<()> {
    let file: PathBuf = if path.is_dir() { path.join(METRICS_FILE) } else { path.to_path_buf() };
    let epochs = read_metrics_file(&file)
        .with_context(|| format!("Failed to read metrics from {}", file.display()))?;
    if epochs.is_empty() {
        bail!("{} contains no epochs", file.display());
    }

    match metric {
        Some(name) => {
            let metric: Metric = name.parse()?;
            for m in &epochs {
                println!("epoch {:>3}  {:.4}", m.epoch, m.get(metric));
            }
            if let Some(best) = best_epoch(&epochs, metric) {
                println!("\nbest {metric}: {:.4} at epoch {}", best.get(metric), best.epoch);
            }
        }
        None => {
            let header: Vec<String> = Metric::ALL.iter().map(|m| format!("{:>10}", m.key())).collect();
            println!("{:>5} {}", "epoch", header.join(" "));
            for m in &epochs {
                let values: Vec<String> = Metric::ALL.iter().map(|&k| format!("{:>10.4}", m.get(k))).collect();
                println!("{:>5} {}", m.epoch, values.join(" "));
            }
        }
    }
    Ok(())
}

/// Lowest loss, highest everything else; the earliest epoch wins ties.
fn best_epoch(epochs: &[EpochMetrics], metric: Metric) -> Option<&EpochMetrics> {
    let better = |a: f64, b: f64| if metric == Metric::TrainLoss { a < b } else { a > b };
    epochs.iter().fold(None, |best: Option<&EpochMetrics>, m| match best {
        Some(b) if !better(m.get(metric), b.get(metric)) => Some(b),
        _ => Some(m),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(epoch: usize, train_loss: f64, f1: f64) -> EpochMetrics {
        EpochMetrics { epoch, train_loss, train_acc: 0.5, val_acc: 0.5, precision: 0.5, recall: 0.5, f1 }
    }

    #[test]
    fn best_epoch_direction_depends_on_metric() {
        let epochs = vec![epoch(1, 0.9, 0.6), epoch(2, 0.4, 0.8), epoch(3, 0.5, 0.8)];
        assert_eq!(best_epoch(&epochs, Metric::F1).unwrap().epoch, 2);
        assert_eq!(best_epoch(&epochs, Metric::TrainLoss).unwrap().epoch, 2);
    }

    #[test]
    fn reads_log_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let lines: Vec<String> = [epoch(1, 0.7, 0.5), epoch(2, 0.3, 0.9)].iter().map(|m| m.to_string()).collect();
        std::fs::write(dir.path().join(METRICS_FILE), lines.join("\n")).unwrap();
        assert!(run(dir.path(), Some("f1")).is_ok());
        assert!(run(dir.path(), None).is_ok());
        assert!(run(dir.path(), Some("bogus")).is_err());
    }
}
