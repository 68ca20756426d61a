//! Binary classification metrics and the per-epoch metrics log.
//!
//! The log is a plain text file with one line per epoch:
//!
//! ```text
//! Epoch 1, train_loss: 0.6931, train_acc: 0.5000, val_acc: 0.5500, precision: 0.6000, recall: 0.4000, f1: 0.4800
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::labels::Label;

/// Confusion-matrix counts with [`Label::Toxic`] as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    /// Count `(predicted, actual)` class-id pairs.
    pub fn from_predictions(predicted: &[u32], actual: &[u32]) -> Self {
        let mut c = Self::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            c.record(p, a);
        }
        c
    }

    pub fn record(&mut self, predicted: u32, actual: u32) {
        let positive = Label::Toxic.class_id();
        match (predicted == positive, actual == positive) {
            (true, true) => self.true_positive += 1,
            (true, false) => self.false_positive += 1,
            (false, false) => self.true_negative += 1,
            (false, true) => self.false_negative += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.true_positive += other.true_positive;
        self.false_positive += other.false_positive;
        self.true_negative += other.true_negative;
        self.false_negative += other.false_negative;
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// One epoch's summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_acc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl EpochMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TrainLoss => self.train_loss,
            Metric::TrainAcc => self.train_acc,
            Metric::ValAcc => self.val_acc,
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::F1 => self.f1,
        }
    }

    /// Parse one log line.
    pub fn parse_line(line: &str) -> CoreResult<Self> {
        let bad = |reason: &str| CoreError::config("metrics line", format!("{reason}: {line:?}"));

        let mut parts = line.trim().split(',');
        let epoch = parts
            .next()
            .and_then(|p| p.trim().strip_prefix("Epoch"))
            .and_then(|n| n.trim().parse::<usize>().ok())
            .ok_or_else(|| bad("expected 'Epoch N'"))?;

        let mut values = [None::<f64>; 6];
        for part in parts {
            let (key, value) = part.split_once(':').ok_or_else(|| bad("expected 'key: value'"))?;
            let metric: Metric = key.trim().parse()?;
            let value = value.trim().parse::<f64>().map_err(|_| bad("non-numeric value"))?;
            values[metric as usize] = Some(value);
        }

        let get = |m: Metric| values[m as usize].ok_or_else(|| bad(&format!("missing {m}")));
        Ok(Self {
            epoch,
            train_loss: get(Metric::TrainLoss)?,
            train_acc: get(Metric::TrainAcc)?,
            val_acc: get(Metric::ValAcc)?,
            precision: get(Metric::Precision)?,
            recall: get(Metric::Recall)?,
            f1: get(Metric::F1)?,
        })
    }
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {}, train_loss: {:.4}, train_acc: {:.4}, val_acc: {:.4}, precision: {:.4}, recall: {:.4}, f1: {:.4}",
            self.epoch, self.train_loss, self.train_acc, self.val_acc, self.precision, self.recall, self.f1,
        )
    }
}

/// Selector for one metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TrainLoss = 0,
    TrainAcc = 1,
    ValAcc = 2,
    Precision = 3,
    Recall = 4,
    F1 = 5,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::TrainLoss,
        Metric::TrainAcc,
        Metric::ValAcc,
        Metric::Precision,
        Metric::Recall,
        Metric::F1,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::TrainLoss => "train_loss",
            Self::TrainAcc => "train_acc",
            Self::ValAcc => "val_acc",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Metric::ALL.into_iter().find(|m| m.key() == s).ok_or_else(|| {
            CoreError::config(
                "metric",
                format!(
                    "unknown metric '{s}'; valid values: {}",
                    Metric::ALL.map(Metric::key).join(", ")
                ),
            )
        })
    }
}

/// Append-only metrics log file.
pub struct MetricsLog {
    path: PathBuf,
}

impl MetricsLog {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(&path)?;
        debug!(path = %path.display(), "Metrics log created");
        Ok(Self { path })
    }

    pub fn append(&self, m: &EpochMetrics) -> CoreResult<()> {
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(f, "{m}")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every epoch line from a metrics log.  Blank lines are skipped.
pub fn read_metrics_file(path: &Path) -> CoreResult<Vec<EpochMetrics>> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(EpochMetrics::parse_line)
        .collect()
}
