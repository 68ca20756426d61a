//! Model export.
//!
//! Produces:
//! ```text
//! <output_dir>/
//!   model.safetensors      trained weights
//!   student_config.json    LSTM architecture (config.json for BERT students)
//!   labels.json            model name, id2label / label2id
//!   tokenizer.json         copied from the teacher directory
//!   tokenizer_config.json  (optional) copied from the teacher directory
//! ```
//!
//! The result loads with [`detox_core::load_classifier`] and
//! [`Student::from_pretrained`](crate::student::Student::from_pretrained).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use detox_core::{CoreError, TrainableClassifier};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DistillError, DistillResult};

pub const LABELS_FILE: &str = "labels.json";

/// Contents of `labels.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub id2label: BTreeMap<usize, String>,
    pub label2id: BTreeMap<String, usize>,
}

impl LabelsFile {
    fn new(labels: &[String], model_name: Option<&str>) -> Self {
        Self {
            model_name: model_name.map(str::to_owned),
            id2label: labels.iter().cloned().enumerate().collect(),
            label2id: labels.iter().cloned().enumerate().map(|(i, l)| (l, i)).collect(),
        }
    }
}

/// Write the trained `student` and everything needed to reload it to
/// `output_dir`.  Returns the files written.
///
/// `tokenizer_src_dir` is the teacher's model directory; its tokenizer files
/// are copied because the student reads the same token ids.
pub fn export_student<S>(
    student: &S,
    tokenizer_src_dir: &Path,
    output_dir: &Path,
    model_name: Option<&str>,
) -> DistillResult<Vec<PathBuf>>
where
    S: TrainableClassifier + ?Sized,
{
    std::fs::create_dir_all(output_dir).map_err(|e| DistillError::persistence(output_dir, e))?;

    student.save(output_dir).map_err(|e| DistillError::persistence(output_dir, e))?;
    info!(output_dir = %output_dir.display(), "Student weights saved");

    let mut written = vec![output_dir.join("model.safetensors")];

    let labels_path = output_dir.join(LABELS_FILE);
    let labels = LabelsFile::new(&student.id2label(), model_name);
    let json = serde_json::to_string_pretty(&labels).map_err(|e| DistillError::persistence(&labels_path, e))?;
    std::fs::write(&labels_path, json).map_err(|e| DistillError::persistence(&labels_path, e))?;
    written.push(labels_path);

    written.extend(copy_tokenizer_files(tokenizer_src_dir, output_dir)?);

    info!(output_dir = %output_dir.display(), files = written.len(), "Export complete");
    Ok(written)
}

/// Copy tokenizer artifacts from `src_dir`.  A missing `tokenizer.json` is
/// only a warning: the export is still usable with an external tokenizer.
fn copy_tokenizer_files(src_dir: &Path, dst_dir: &Path) -> DistillResult<Vec<PathBuf>> {
    let candidates = [
        "tokenizer.json",
        "tokenizer_config.json",
        "special_tokens_map.json",
        "vocab.txt",
        "vocab.json",
        "merges.txt",
    ];

    if src_dir == dst_dir {
        return Ok(Vec::new());
    }

    let mut copied = Vec::new();
    for name in candidates {
        let src = src_dir.join(name);
        if !src.exists() {
            if name == "tokenizer.json" {
                warn!(src_dir = %src_dir.display(), "No tokenizer.json to copy");
            }
            continue;
        }
        let dst = dst_dir.join(name);
        std::fs::copy(&src, &dst).map_err(|e| DistillError::persistence(&dst, CoreError::Io(e)))?;
        info!(file = name, "Tokenizer file copied");
        copied.push(dst);
    }
    Ok(copied)
}

/// Read `labels.json` back.
pub fn read_labels(dir: &Path) -> DistillResult<LabelsFile> {
    let path = dir.join(LABELS_FILE);
    let text = std::fs::read_to_string(&path).map_err(|e| DistillError::persistence(&path, e))?;
    serde_json::from_str(&text).map_err(|e| DistillError::persistence(&path, e))
}
