//! Labeled CSV datasets.
//!
//! CSV files must have a text column and a toxicity label column.  Header
//! names are trimmed and lowercased before matching, and a column named
//! `toxic` is accepted in place of `is_toxic`.  Rows whose text or label is
//! empty are dropped; any other label goes through
//! [`normalize_label`](crate::labels::normalize_label) and fails the load if
//! it is not recognised.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::labels::{normalize_label, Label};

/// Default name of the text column.
pub const TEXT_COLUMN: &str = "text";
/// Default name of the label column.
pub const LABEL_COLUMN: &str = "is_toxic";

/// Aliases accepted for the label column after header normalisation.
const LABEL_ALIASES: &[(&str, &str)] = &[("toxic", LABEL_COLUMN), ("label", LABEL_COLUMN)];

/// A single labeled example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledText {
    pub text: String,
    pub label: Label,
}

/// An ordered collection of labeled examples.
#[derive(Debug, Clone, Default)]
pub struct TextDataset {
    records: Vec<LabeledText>,
}

impl TextDataset {
    pub fn new(records: Vec<LabeledText>) -> Self {
        Self { records }
    }

    /// Load a CSV file using the default `text` / `is_toxic` columns.
    pub fn from_csv(path: &Path) -> CoreResult<Self> {
        Self::from_csv_columns(path, TEXT_COLUMN, LABEL_COLUMN)
    }

    /// Load a CSV file with explicit column names.
    pub fn from_csv_columns(path: &Path, text_column: &str, label_column: &str) -> CoreResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::None)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        let text_idx = column_index(&headers, text_column, path)?;
        let label_idx = column_index(&headers, label_column, path)?;

        let mut records = Vec::new();
        let mut dropped = 0usize;

        for (i, row) in reader.records().enumerate() {
            let row = row?;
            // Header is line 1, so the first data row is line 2.
            let line = i + 2;
            let text = row.get(text_idx).unwrap_or("").trim();
            let raw_label = row.get(label_idx).unwrap_or("").trim();

            if text.is_empty() || raw_label.is_empty() {
                dropped += 1;
                continue;
            }

            let label = normalize_label(raw_label).map_err(|_| CoreError::InvalidLabel {
                value: raw_label.to_string(),
                row: Some(line),
            })?;
            records.push(LabeledText { text: text.to_string(), label });
        }

        if dropped > 0 {
            warn!(path = %path.display(), dropped, "Dropped rows with empty text or label");
        }

        let ds = Self { records };
        info!(
            path = %path.display(),
            rows = ds.len(),
            toxic = ds.count(Label::Toxic),
            non_toxic = ds.count(Label::NonToxic),
            "Dataset loaded"
        );
        Ok(ds)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[LabeledText] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LabeledText> {
        self.records
    }

    /// Number of records with `label`.
    pub fn count(&self, label: Label) -> usize {
        self.records.iter().filter(|r| r.label == label).count()
    }

    /// Append every record of `other`.
    pub fn extend(&mut self, other: TextDataset) {
        self.records.extend(other.records);
    }

    /// Write the dataset as a `text,is_toxic` CSV with numeric labels.
    pub fn write_csv(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([TEXT_COLUMN, LABEL_COLUMN])?;
        for r in &self.records {
            writer.write_record([r.text.as_str(), r.label.as_csv_value()])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Shuffle with `seed` and split into `(train, validation)`.
    pub fn split(self, train_fraction: f64, seed: u64) -> CoreResult<(TextDataset, TextDataset)> {
        let (train, val) = split_train_val(self.records, train_fraction, seed)?;
        Ok((TextDataset::new(train), TextDataset::new(val)))
    }
}

/// Merge several labeled CSV files into one normalised CSV at `output`.
///
/// Returns the merged dataset so callers can report its size.
pub fn merge_csv(inputs: &[&Path], output: &Path) -> CoreResult<TextDataset> {
    if inputs.is_empty() {
        return Err(CoreError::config("inputs", "at least one CSV file is required"));
    }
    let mut merged = TextDataset::default();
    for path in inputs {
        merged.extend(TextDataset::from_csv(path)?);
    }
    merged.write_csv(output)?;
    info!(output = %output.display(), rows = merged.len(), "Merged dataset written");
    Ok(merged)
}

/// Shuffle `items` with a seeded RNG and split into `(train, validation)`.
///
/// `train_fraction` must lie in `(0, 1]`.  The split index is rounded and
/// clamped so tiny datasets never panic.
pub fn split_train_val<T>(
    mut items: Vec<T>,
    train_fraction: f64,
    seed: u64,
) -> CoreResult<(Vec<T>, Vec<T>)> {
    if !(train_fraction > 0.0 && train_fraction <= 1.0) {
        return Err(CoreError::config(
            "train_fraction",
            format!("must be in (0, 1], got {train_fraction}"),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let split_at = ((items.len() as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(items.len());
    let val = items.split_off(split_at);
    Ok((items, val))
}

fn normalize_header(h: &str) -> String {
    let h = h.trim().to_lowercase();
    LABEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == h)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(h)
}

fn column_index(headers: &[String], wanted: &str, path: &Path) -> CoreResult<usize> {
    let wanted = normalize_header(wanted);
    headers.iter().position(|h| *h == wanted).ok_or_else(|| {
        CoreError::config(
            "csv",
            format!(
                "{}: missing column '{wanted}' (found: {})",
                path.display(),
                headers.join(", ")
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let p = dir.path().join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn loads_and_normalises_labels() {
        let dir = TempDir::new().unwrap();
        let p = write(
            &dir,
            "data.csv",
            "text,is_toxic\nyou are awful,toxic\nhave a nice day,0\nshut up,Yes\n",
        );
        let ds = TextDataset::from_csv(&p).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.count(Label::Toxic), 2);
        assert_eq!(ds.as_slice()[1].label, Label::NonToxic);
    }

    #[test]
    fn headers_are_normalised_and_toxic_alias_accepted() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "detox.csv", " Text , TOXIC \nhello,0\nidiot,1\n");
        let ds = TextDataset::from_csv(&p).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.as_slice()[1].label, Label::Toxic);
    }

    #[test]
    fn empty_rows_are_dropped() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "d.csv", "text,is_toxic\n,1\nfine,\nok,0\n");
        let ds = TextDataset::from_csv(&p).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.as_slice()[0].text, "ok");
    }

    #[test]
    fn invalid_label_reports_row() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "d.csv", "text,is_toxic\nok,0\nhmm,perhaps\n");
        match TextDataset::from_csv(&p).unwrap_err() {
            CoreError::InvalidLabel { value, row } => {
                assert_eq!(value, "perhaps");
                assert_eq!(row, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_column_is_config_error() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "d.csv", "comment,is_toxic\nok,0\n");
        assert!(matches!(TextDataset::from_csv(&p), Err(CoreError::Config { .. })));
    }

    #[test]
    fn merge_writes_numeric_labels() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "text,is_toxic\nbad words,toxic\n");
        let b = write(&dir, "b.csv", "Text,Toxic\nnice words,non-toxic\n");
        let out = dir.path().join("out/normalized.csv");
        let merged = merge_csv(&[a.as_path(), b.as_path()], &out).unwrap();
        assert_eq!(merged.len(), 2);
        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(written, "text,is_toxic\nbad words,1\nnice words,0\n");
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let items: Vec<u32> = (0..10).collect();
        let (t1, v1) = split_train_val(items.clone(), 0.8, 7).unwrap();
        let (t2, v2) = split_train_val(items, 0.8, 7).unwrap();
        assert_eq!(t1.len(), 8);
        assert_eq!(v1.len(), 2);
        assert_eq!(t1, t2);
        assert_eq!(v1, v2);
    }

    #[test]
    fn split_rejects_bad_fraction() {
        assert!(split_train_val(vec![1, 2, 3], 0.0, 1).is_err());
        assert!(split_train_val(vec![1, 2, 3], 1.5, 1).is_err());
    }
}
