//! Unlabeled text loading for distillation.
//!
//! Accepted inputs:
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.txt`    | one text per non-empty line |
//! | `.jsonl`  | one `{"text": "..."}` object per non-empty line |
//! | `.csv`    | a `text` column (header matched case-insensitively) |
//!
//! A directory is scanned (non-recursively) for those extensions and its
//! files are concatenated in alphabetical order.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use detox_core::dataset::TEXT_COLUMN;
use detox_core::CoreError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{DistillError, DistillResult};

const EXTENSIONS: &[&str] = &["txt", "jsonl", "csv"];

#[derive(Deserialize)]
struct RawSample {
    text: String,
}

/// Load every text from `path` (a file or a directory).
pub fn load_samples(path: &Path) -> DistillResult<Vec<String>> {
    let files = if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| DistillError::Dataset(CoreError::Io(e)))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_supported_extension(p))
            .collect();

        // Deterministic order
        entries.sort();

        if entries.is_empty() {
            return Err(DistillError::config(format!(
                "no .txt, .jsonl or .csv files found in {}",
                path.display()
            )));
        }
        entries
    } else {
        vec![path.to_path_buf()]
    };

    let mut texts = Vec::new();
    for file in &files {
        let before = texts.len();
        load_file(file, &mut texts).map_err(DistillError::Dataset)?;
        info!(path = %file.display(), count = texts.len() - before, "Loaded sample file");
    }

    info!(total = texts.len(), "Samples loaded");
    Ok(texts)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_file(path: &Path, out: &mut Vec<String>) -> Result<(), CoreError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => {
            let file = fs::File::open(path)?;
            for line in io::BufReader::new(file).lines() {
                let line = line?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
        }
        "jsonl" => {
            let file = fs::File::open(path)?;
            for (line_no, line) in io::BufReader::new(file).lines().enumerate() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let raw: RawSample = serde_json::from_str(trimmed).map_err(|e| {
                    CoreError::config(
                        "jsonl",
                        format!("{}:{}: expected {{\"text\": ...}}: {e}", path.display(), line_no + 1),
                    )
                })?;
                if !raw.text.trim().is_empty() {
                    out.push(raw.text);
                }
            }
        }
        "csv" => {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
            let idx = reader
                .headers()?
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(TEXT_COLUMN))
                .ok_or_else(|| {
                    CoreError::config("csv", format!("{}: missing '{TEXT_COLUMN}' column", path.display()))
                })?;
            let mut skipped = 0usize;
            for row in reader.records() {
                let row = row?;
                match row.get(idx).map(str::trim) {
                    Some(t) if !t.is_empty() => out.push(t.to_string()),
                    _ => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "Skipped rows with empty text");
            }
        }
        other => {
            return Err(CoreError::config(
                "samples",
                format!("{}: unsupported extension '{other}' (expected txt, jsonl or csv)", path.display()),
            ))
        }
    }
    Ok(())
}
