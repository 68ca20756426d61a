use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor, Var, D};
use candle_nn::VarMap;
use tracing::{debug, info, warn};

use crate::batch::BatchTensors;
use crate::error::{CoreError, CoreResult};
use crate::labels::Label;

/// A text classifier mapping `(input_ids, attention_mask)` to per-class logits.
pub trait Classifier {
    /// Number of output classes (width of the logit vector).
    fn num_labels(&self) -> usize;

    /// Forward pass: returns `[batch, num_labels]` logits.
    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor>;

    /// Device the parameters live on.
    fn device(&self) -> &Device;

    /// Class names, index-aligned with the logits.
    fn id2label(&self) -> Vec<String> {
        if self.num_labels() == 2 {
            Label::id2label()
        } else {
            (0..self.num_labels()).map(|i| format!("LABEL_{i}")).collect()
        }
    }
}

/// A classifier whose parameters can be optimised and persisted.
pub trait TrainableClassifier: Classifier {
    /// Every trainable variable, for the optimiser.
    fn trainable_vars(&self) -> Vec<Var>;

    /// Persist weights and architecture config into `dir`.
    fn save(&self, dir: &Path) -> CoreResult<()>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn num_labels(&self) -> usize {
        (**self).num_labels()
    }
    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        (**self).logits(batch)
    }
    fn device(&self) -> &Device {
        (**self).device()
    }
    fn id2label(&self) -> Vec<String> {
        (**self).id2label()
    }
}

impl<C: TrainableClassifier + ?Sized> TrainableClassifier for Box<C> {
    fn trainable_vars(&self) -> Vec<Var> {
        (**self).trainable_vars()
    }
    fn save(&self, dir: &Path) -> CoreResult<()> {
        (**self).save(dir)
    }
}

/// A toxicity score for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToxicityScore {
    /// Predicted class index.
    pub class_id: usize,
    /// Name of the predicted class.
    pub label: String,
    /// Probability of the toxic class for multi-class heads, or the raw
    /// logit for single-output (regression / reward style) heads.
    pub score: f32,
}

/// Turn a `[batch, num_labels]` logit tensor into per-row scores.
///
/// Two-or-more-class heads use softmax probabilities and report the
/// probability of class 1.  Single-logit heads report the logit itself.
pub fn scores_from_logits(logits: &Tensor, id2label: &[String]) -> CoreResult<Vec<ToxicityScore>> {
    let (_batch, classes) = logits.dims2()?;
    let logits = logits.to_dtype(candle_core::DType::F32)?;

    let rows: Vec<Vec<f32>> = if classes == 1 {
        logits.to_vec2::<f32>()?
    } else {
        candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec2::<f32>()?
    };

    let scores = rows
        .into_iter()
        .map(|row| {
            let class_id = if classes == 1 {
                usize::from(row[0] > 0.0)
            } else {
                argmax(&row)
            };
            let score = if classes == 1 { row[0] } else { row[Label::Toxic.class_id() as usize] };
            let label = id2label
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{class_id}"));
            ToxicityScore { class_id, label, score }
        })
        .collect();

    Ok(scores)
}

/// Index of the largest value (first on ties).
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Load a saved classifier for inference.
///
/// A directory holding `student_config.json` is an [`LstmClassifier`];
/// anything else is treated as a BERT-family checkpoint and loaded frozen.
///
/// [`LstmClassifier`]: crate::lstm::LstmClassifier
pub fn load_classifier(dir: &Path, device: &Device) -> CoreResult<Box<dyn Classifier>> {
    if dir.join(crate::lstm::STUDENT_CONFIG_FILE).exists() {
        Ok(Box::new(crate::lstm::LstmClassifier::load(dir, device)?))
    } else {
        Ok(Box::new(crate::bert::BertClassifier::load_frozen(dir, device)?))
    }
}

// ── Weight files ──────────────────────────────────────────────────────────────

/// Locate safetensors weights in `dir`: every shard listed by
/// `model.safetensors.index.json`, or the single `model.safetensors`.
pub fn collect_safetensor_paths(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let index_path = dir.join("model.safetensors.index.json");
    if index_path.exists() {
        let json = std::fs::read_to_string(&index_path)?;
        let index: serde_json::Value = serde_json::from_str(&json)?;
        let mut shards: Vec<String> = index["weight_map"]
            .as_object()
            .map(|m| {
                m.values()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect::<std::collections::HashSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        shards.sort();
        return Ok(shards.iter().map(|s| dir.join(s)).collect());
    }

    let single = dir.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    Err(CoreError::Unsupported(format!(
        "no safetensors weights found in {} (only model.safetensors / sharded safetensors are supported)",
        dir.display()
    )))
}

/// Overwrite the variables of `varmap` with the same-named tensors found in
/// `paths`.
///
/// Variables missing from every file keep their fresh initialisation (a new
/// classification head on a pretrained encoder, for instance).  Returns the
/// names of those variables.
pub fn load_matching_weights(varmap: &VarMap, paths: &[PathBuf], device: &Device) -> CoreResult<Vec<String>> {
    let mut loaded = 0usize;
    let mut pending: Vec<String> = {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| CoreError::Unsupported("VarMap lock poisoned".into()))?;
        data.keys().cloned().collect()
    };

    for path in paths {
        let tensors = candle_core::safetensors::load(path, device)?;
        let data = varmap
            .data()
            .lock()
            .map_err(|_| CoreError::Unsupported("VarMap lock poisoned".into()))?;

        pending.retain(|name| {
            let Some(src) = tensors.get(name) else { return true };
            let Some(var) = data.get(name) else { return true };
            match src.to_dtype(var.dtype()).and_then(|t| var.set(&t)) {
                Ok(()) => {
                    loaded += 1;
                    false
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Cannot load tensor; keeping fresh initialisation");
                    true
                }
            }
        });
        debug!(path = %path.display(), "Weights file applied");
    }

    pending.sort();
    info!(loaded, fresh = pending.len(), "Pretrained weights loaded into VarMap");
    Ok(pending)
}
