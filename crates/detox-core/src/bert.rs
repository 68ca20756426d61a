//! BERT-family sequence classifiers: BERT, RoBERTa and DistilBERT.
//!
//! The architecture comes from `model_type` in `config.json` (or, when that
//! is absent, from the checkpoint's tensor names) and selects the candle
//! encoder:
//!
//! | `model_type`                        | Encoder                   | Head                                        |
//! |-------------------------------------|---------------------------|---------------------------------------------|
//! | `bert`                              | `bert::BertModel`         | `bert.pooler.dense` → tanh → `classifier`   |
//! | `roberta`, `xlm-roberta`, `camembert` | `xlm_roberta::XLMRobertaModel` | `classifier.dense` → tanh → `classifier.out_proj` |
//! | `distilbert`                        | `distilbert::DistilBertModel` | `pre_classifier` → relu → `classifier`  |
//!
//! The encoder is always built under the prefix the checkpoint actually uses
//! (`bert.`, `roberta.`, `distilbert.` or none), so frozen and trainable
//! loads see the same tensor names.
//!
//! A frozen classifier is loaded from memory-mapped safetensors, so its
//! weights are plain tensors and never receive gradients.  A trainable one is
//! built in a [`VarMap`] and initialised from the checkpoint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use candle_transformers::models::xlm_roberta::{Config as RobertaConfig, XLMRobertaModel};
use serde::Deserialize;
use tracing::{info, warn};

use crate::batch::BatchTensors;
use crate::classifier::{collect_safetensor_paths, load_matching_weights, Classifier, TrainableClassifier};
use crate::error::{CoreError, CoreResult};

const WORD_EMBEDDINGS: &str = "embeddings.word_embeddings.weight";

/// Encoder family of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Bert,
    Roberta,
    DistilBert,
}

impl Architecture {
    const ALL: [Self; 3] = [Self::Roberta, Self::DistilBert, Self::Bert];

    fn from_model_type(model_type: &str) -> Option<Self> {
        match model_type {
            "bert" => Some(Self::Bert),
            "roberta" | "xlm-roberta" | "camembert" => Some(Self::Roberta),
            "distilbert" => Some(Self::DistilBert),
            _ => None,
        }
    }

    /// Name prefix of the encoder in Hugging Face `*ForSequenceClassification` checkpoints.
    fn prefix(self) -> &'static str {
        match self {
            Self::Bert => "bert",
            Self::Roberta => "roberta",
            Self::DistilBert => "distilbert",
        }
    }
}

/// The fields of a Hugging Face `config.json` shared by every architecture.
#[derive(Debug, Deserialize)]
struct CheckpointConfig {
    vocab_size: usize,
    #[serde(default)]
    hidden_size: Option<usize>,
    /// DistilBERT's name for `hidden_size`.
    #[serde(default)]
    dim: Option<usize>,
    #[serde(default)]
    num_labels: Option<usize>,
    #[serde(default)]
    id2label: Option<BTreeMap<String, String>>,
    #[serde(default)]
    model_type: Option<String>,
}

impl CheckpointConfig {
    fn num_labels(&self) -> usize {
        self.id2label
            .as_ref()
            .map(|m| m.len())
            .filter(|&n| n > 0)
            .or(self.num_labels)
            .unwrap_or(2)
    }

    fn hidden_size(&self) -> CoreResult<usize> {
        self.hidden_size
            .or(self.dim)
            .ok_or_else(|| CoreError::config("config.json", "neither hidden_size nor dim is set"))
    }

    /// `id2label` ordered by numeric id.
    fn labels(&self) -> Option<Vec<String>> {
        let map = self.id2label.as_ref()?;
        let mut pairs: Vec<(usize, String)> = map
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|k| (k, v.clone())))
            .collect();
        pairs.sort_by_key(|(k, _)| *k);
        Some(pairs.into_iter().map(|(_, v)| v).collect())
    }
}

/// Where the encoder and head weights live in the checkpoint.
#[derive(Debug, Clone)]
struct Layout {
    arch: Architecture,
    prefix: Option<&'static str>,
    dense: String,
    out: &'static str,
}

impl Layout {
    fn is_head(&self, name: &str) -> bool {
        [self.dense.as_str(), self.out]
            .iter()
            .any(|p| name.strip_prefix(p).is_some_and(|rest| rest.starts_with('.')))
    }
}

enum Encoder {
    Bert(BertModel),
    Roberta(XLMRobertaModel),
    DistilBert(DistilBertModel),
}

impl Encoder {
    /// `[B, L]` ids and mask → `[B, L, H]` hidden states.
    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor> {
        let ids = &batch.input_ids;
        let mask = &batch.attention_mask;
        match self {
            Self::Bert(m) => m.forward(ids, &ids.zeros_like()?, Some(mask)),
            Self::Roberta(m) => m.forward(ids, mask, &ids.zeros_like()?, None, None, None),
            Self::DistilBert(m) => {
                // DistilBERT takes the inverse mask: non-zero where attention is blocked.
                let (b, l) = mask.dims2()?;
                let blocked = mask.eq(0u32)?.reshape((b, 1, 1, l))?;
                m.forward(ids, &blocked)
            }
        }
    }
}

/// Classification head on top of the first-token hidden state.
struct Head {
    dense: Linear,
    out: Linear,
    arch: Architecture,
}

impl Head {
    fn forward(&self, cls: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.dense.forward(cls)?;
        let x = match self.arch {
            Architecture::DistilBert => x.relu()?,
            Architecture::Bert | Architecture::Roberta => x.tanh()?,
        };
        self.out.forward(&x)
    }
}

/// A BERT-family encoder with a sequence classification head.
pub struct BertClassifier {
    encoder: Encoder,
    head: Head,
    arch: Architecture,
    num_labels: usize,
    vocab_size: usize,
    id2label: Option<Vec<String>>,
    config_json: serde_json::Value,
    /// Present only for trainable classifiers.
    varmap: Option<VarMap>,
    device: Device,
}

impl BertClassifier {
    /// Load a frozen classifier from `model_dir` (`config.json` + safetensors).
    pub fn load_frozen(model_dir: &Path, device: &Device) -> CoreResult<Self> {
        let (ckpt, raw) = read_config(model_dir)?;
        let paths = collect_safetensor_paths(model_dir)?;

        // SAFETY: the safetensors files are treated as read-only for the
        // lifetime of the mapping.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&paths, DType::F32, device)? };
        let layout = detect_layout(&vb, ckpt.model_type.as_deref())?;
        let num_labels = ckpt.num_labels();

        let (encoder, head) = build(&vb, &raw, &layout, ckpt.hidden_size()?, num_labels)?;
        info!(
            model_dir = %model_dir.display(),
            arch = ?layout.arch,
            prefix = layout.prefix.unwrap_or(""),
            num_labels,
            "Frozen classifier loaded"
        );

        Ok(Self {
            encoder,
            head,
            arch: layout.arch,
            num_labels,
            vocab_size: ckpt.vocab_size,
            id2label: ckpt.labels(),
            config_json: raw,
            varmap: None,
            device: device.clone(),
        })
    }

    /// Load a trainable classifier from `model_dir`.
    ///
    /// Every encoder weight must come from the checkpoint.  When `num_labels`
    /// differs from the checkpoint's head, or the checkpoint has no head, the
    /// head starts from a fresh initialisation.
    pub fn load_trainable(model_dir: &Path, num_labels: Option<usize>, device: &Device) -> CoreResult<Self> {
        let (ckpt, mut raw) = read_config(model_dir)?;
        let paths = collect_safetensor_paths(model_dir)?;

        // SAFETY: as in `load_frozen`; the mapping only lives for the peek.
        let layout = {
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&paths, DType::F32, device)? };
            detect_layout(&vb, ckpt.model_type.as_deref())?
        };

        let checkpoint_labels = ckpt.num_labels();
        let num_labels = num_labels.unwrap_or(checkpoint_labels);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let (encoder, head) = build(&vb, &raw, &layout, ckpt.hidden_size()?, num_labels)?;

        // A head of another width is skipped by the loader and stays fresh;
        // a missing encoder tensor is an error.
        let fresh = load_matching_weights(&varmap, &paths, device)?;
        let (fresh_head, fresh_encoder): (Vec<String>, Vec<String>) =
            fresh.into_iter().partition(|name| layout.is_head(name));
        if let Some(first) = fresh_encoder.first() {
            return Err(CoreError::config(
                "weights",
                format!(
                    "{} encoder tensor(s) missing from {} or of the wrong shape (first: {first})",
                    fresh_encoder.len(),
                    model_dir.display()
                ),
            ));
        }
        if num_labels != checkpoint_labels {
            warn!(checkpoint_labels, num_labels, out = layout.out, "Classification head re-initialised for new label count");
        }
        if !fresh_head.is_empty() {
            info!(fresh = ?fresh_head, "Head parameters not found in checkpoint were freshly initialised");
        }

        let id2label = if num_labels == checkpoint_labels { ckpt.labels() } else { None };
        if let Some(obj) = raw.as_object_mut() {
            obj.insert("num_labels".into(), serde_json::json!(num_labels));
            obj.remove("id2label");
            obj.remove("label2id");
        }

        Ok(Self {
            encoder,
            head,
            arch: layout.arch,
            num_labels,
            vocab_size: ckpt.vocab_size,
            id2label,
            config_json: raw,
            varmap: Some(varmap),
            device: device.clone(),
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    /// Rows of the word embedding table; input ids must stay below this.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn is_trainable(&self) -> bool {
        self.varmap.is_some()
    }
}

impl Classifier for BertClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn logits(&self, batch: &BatchTensors) -> CoreResult<Tensor> {
        let hidden = self.encoder.forward(batch)?;
        // [B, L, H] → [B, H] at the first ([CLS] / <s>) position.
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        Ok(self.head.forward(&cls)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn id2label(&self) -> Vec<String> {
        match &self.id2label {
            Some(labels) if labels.len() == self.num_labels => labels.clone(),
            _ => crate::labels::Label::id2label()
                .into_iter()
                .take(self.num_labels)
                .chain((2..self.num_labels).map(|i| format!("LABEL_{i}")))
                .collect(),
        }
    }
}

impl TrainableClassifier for BertClassifier {
    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.as_ref().map(|v| v.all_vars()).unwrap_or_default()
    }

    fn save(&self, dir: &Path) -> CoreResult<()> {
        let varmap = self.varmap.as_ref().ok_or_else(|| {
            CoreError::Unsupported(format!("{:?} classifier was loaded frozen and cannot be saved", self.arch))
        })?;
        std::fs::create_dir_all(dir)?;
        varmap.save(dir.join("model.safetensors"))?;

        let mut cfg = self.config_json.clone();
        if let Some(obj) = cfg.as_object_mut() {
            let labels = Classifier::id2label(self);
            let id2label: serde_json::Map<String, serde_json::Value> = labels
                .iter()
                .enumerate()
                .map(|(i, l)| (i.to_string(), serde_json::json!(l)))
                .collect();
            let label2id: serde_json::Map<String, serde_json::Value> = labels
                .iter()
                .enumerate()
                .map(|(i, l)| (l.clone(), serde_json::json!(i)))
                .collect();
            obj.insert("id2label".into(), id2label.into());
            obj.insert("label2id".into(), label2id.into());
        }
        std::fs::write(dir.join("config.json"), serde_json::to_string_pretty(&cfg)?)?;
        info!(dir = %dir.display(), "Classifier saved");
        Ok(())
    }
}

fn read_config(model_dir: &Path) -> CoreResult<(CheckpointConfig, serde_json::Value)> {
    let path: PathBuf = model_dir.join("config.json");
    let text = std::fs::read_to_string(&path).map_err(|e| {
        CoreError::config("config.json", format!("cannot read {}: {e}", path.display()))
    })?;
    let raw: serde_json::Value = serde_json::from_str(&text)?;
    let ckpt: CheckpointConfig = serde_json::from_value(raw.clone())?;
    Ok((ckpt, raw))
}

/// RoBERTa configs often omit keys the candle config requires.
fn roberta_config(raw: &serde_json::Value) -> CoreResult<RobertaConfig> {
    let mut cfg = raw.clone();
    if let Some(obj) = cfg.as_object_mut() {
        for (key, value) in [
            ("position_embedding_type", serde_json::json!("absolute")),
            ("hidden_act", serde_json::json!("gelu")),
            ("hidden_dropout_prob", serde_json::json!(0.1)),
            ("attention_probs_dropout_prob", serde_json::json!(0.1)),
            ("layer_norm_eps", serde_json::json!(1e-5)),
            ("type_vocab_size", serde_json::json!(1)),
            ("pad_token_id", serde_json::json!(1)),
        ] {
            obj.entry(key).or_insert(value);
        }
    }
    Ok(serde_json::from_value(cfg)?)
}

fn detect_layout(vb: &VarBuilder, model_type: Option<&str>) -> CoreResult<Layout> {
    let arch = match model_type {
        Some(mt) => Architecture::from_model_type(mt).ok_or_else(|| {
            CoreError::Unsupported(format!(
                "model_type '{mt}' (supported: bert, roberta, xlm-roberta, camembert, distilbert)"
            ))
        })?,
        None => Architecture::ALL
            .into_iter()
            .find(|a| vb.contains_tensor(&format!("{}.{WORD_EMBEDDINGS}", a.prefix())))
            .unwrap_or(if vb.contains_tensor("transformer.layer.0.attention.q_lin.weight") {
                Architecture::DistilBert
            } else {
                Architecture::Bert
            }),
    };

    let prefix = if vb.contains_tensor(&format!("{}.{WORD_EMBEDDINGS}", arch.prefix())) {
        Some(arch.prefix())
    } else if vb.contains_tensor(WORD_EMBEDDINGS) {
        None
    } else {
        return Err(CoreError::Unsupported(format!(
            "checkpoint has no {arch:?} encoder weights ({}.{WORD_EMBEDDINGS} or {WORD_EMBEDDINGS})",
            arch.prefix()
        )));
    };

    let (dense, out) = match arch {
        Architecture::Bert => (
            prefix.map_or_else(|| "pooler.dense".to_string(), |p| format!("{p}.pooler.dense")),
            "classifier",
        ),
        Architecture::Roberta => ("classifier.dense".to_string(), "classifier.out_proj"),
        Architecture::DistilBert => ("pre_classifier".to_string(), "classifier"),
    };

    Ok(Layout { arch, prefix, dense, out })
}

fn build(
    vb: &VarBuilder,
    raw: &serde_json::Value,
    layout: &Layout,
    hidden: usize,
    num_labels: usize,
) -> CoreResult<(Encoder, Head)> {
    let enc_vb = match layout.prefix {
        Some(p) => vb.pp(p),
        None => vb.clone(),
    };
    let encoder = match layout.arch {
        Architecture::Bert => {
            let config: BertConfig = serde_json::from_value(raw.clone())?;
            Encoder::Bert(BertModel::load(enc_vb, &config)?)
        }
        Architecture::Roberta => Encoder::Roberta(XLMRobertaModel::new(&roberta_config(raw)?, enc_vb)?),
        Architecture::DistilBert => {
            let config: DistilBertConfig = serde_json::from_value(raw.clone())?;
            Encoder::DistilBert(DistilBertModel::load(enc_vb, &config)?)
        }
    };
    let head = Head {
        dense: linear(hidden, hidden, vb.pp(&layout.dense))?,
        out: linear(hidden, num_labels, vb.pp(layout.out))?,
        arch: layout.arch,
    };
    Ok((encoder, head))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::batch::{EncodedBatch, Sample};

    const HIDDEN: usize = 8;

    fn bert_json() -> serde_json::Value {
        serde_json::json!({
            "model_type": "bert",
            "vocab_size": 16,
            "hidden_size": HIDDEN,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "intermediate_size": 16,
            "hidden_act": "gelu",
            "hidden_dropout_prob": 0.0,
            "max_position_embeddings": 16,
            "type_vocab_size": 2,
            "initializer_range": 0.02,
            "layer_norm_eps": 1e-12,
            "pad_token_id": 0,
            "id2label": {"0": "non-toxic", "1": "toxic"}
        })
    }

    fn roberta_json() -> serde_json::Value {
        serde_json::json!({
            "model_type": "roberta",
            "vocab_size": 16,
            "hidden_size": HIDDEN,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "intermediate_size": 16,
            "max_position_embeddings": 16,
            "pad_token_id": 1,
            "id2label": {"0": "non-toxic", "1": "toxic"}
        })
    }

    fn distilbert_json() -> serde_json::Value {
        serde_json::json!({
            "model_type": "distilbert",
            "vocab_size": 16,
            "dim": HIDDEN,
            "n_layers": 1,
            "n_heads": 2,
            "hidden_dim": 16,
            "activation": "gelu",
            "max_position_embeddings": 16,
            "initializer_range": 0.02,
            "pad_token_id": 0
        })
    }

    /// Random weights laid out like a Hugging Face `*ForSequenceClassification` checkpoint.
    fn checkpoint_tensors(config: &serde_json::Value) -> HashMap<String, Tensor> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let (dense, out) = match config["model_type"].as_str().unwrap() {
            "bert" => {
                let cfg: BertConfig = serde_json::from_value(config.clone()).unwrap();
                BertModel::load(vb.pp("bert"), &cfg).unwrap();
                ("bert.pooler.dense", "classifier")
            }
            "roberta" => {
                XLMRobertaModel::new(&roberta_config(config).unwrap(), vb.pp("roberta")).unwrap();
                ("classifier.dense", "classifier.out_proj")
            }
            _ => {
                let cfg: DistilBertConfig = serde_json::from_value(config.clone()).unwrap();
                DistilBertModel::load(vb.pp("distilbert"), &cfg).unwrap();
                ("pre_classifier", "classifier")
            }
        };
        linear(HIDDEN, HIDDEN, vb.pp(dense)).unwrap();
        linear(HIDDEN, 2, vb.pp(out)).unwrap();

        let data = varmap.data().lock().unwrap();
        data.iter().map(|(k, v)| (k.clone(), v.as_tensor().clone())).collect()
    }

    fn write_checkpoint(dir: &Path, config: &serde_json::Value, tensors: &HashMap<String, Tensor>) {
        std::fs::write(dir.join("config.json"), serde_json::to_string(config).unwrap()).unwrap();
        candle_core::safetensors::save(tensors, dir.join("model.safetensors")).unwrap();
    }

    fn checkpoint(config: serde_json::Value) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        write_checkpoint(dir.path(), &config, &checkpoint_tensors(&config));
        dir
    }

    fn batch(pad: u32) -> BatchTensors {
        let s = |ids: &[u32], mask: &[u32]| Sample {
            text: String::new(),
            input_ids: ids.to_vec(),
            attention_mask: mask.to_vec(),
        };
        EncodedBatch::new(vec![s(&[2, 5, 7, pad], &[1, 1, 1, 0]), s(&[2, 3, pad, pad], &[1, 1, 0, 0])], None)
            .unwrap()
            .to_tensors(&Device::Cpu)
            .unwrap()
    }

    fn logits(model: &BertClassifier, pad: u32) -> Vec<Vec<f32>> {
        model.logits(&batch(pad)).unwrap().to_vec2::<f32>().unwrap()
    }

    fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>]) {
        for (ra, rb) in a.iter().zip(b) {
            for (x, y) in ra.iter().zip(rb) {
                assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
            }
        }
    }

    fn var(model: &BertClassifier, name: &str) -> Tensor {
        model.varmap.as_ref().unwrap().data().lock().unwrap()[name].as_tensor().clone()
    }

    #[test]
    fn frozen_and_trainable_agree_on_prefixed_checkpoints() {
        for (config, pad) in [(bert_json(), 0), (roberta_json(), 1), (distilbert_json(), 0)] {
            let dir = checkpoint(config);
            let frozen = BertClassifier::load_frozen(dir.path(), &Device::Cpu).unwrap();
            let trainable = BertClassifier::load_trainable(dir.path(), None, &Device::Cpu).unwrap();
            assert_eq!(frozen.architecture(), trainable.architecture());
            assert!(!frozen.is_trainable());
            assert!(trainable.is_trainable());
            assert_close(&logits(&frozen, pad), &logits(&trainable, pad));
        }
    }

    #[test]
    fn architecture_follows_model_type() {
        let cases =
            [(bert_json(), Architecture::Bert), (roberta_json(), Architecture::Roberta), (distilbert_json(), Architecture::DistilBert)];
        for (config, arch) in cases {
            let dir = checkpoint(config);
            let model = BertClassifier::load_frozen(dir.path(), &Device::Cpu).unwrap();
            assert_eq!(model.architecture(), arch);
            assert_eq!(model.vocab_size(), 16);
            assert_eq!(model.id2label(), crate::labels::Label::id2label());
        }
    }

    #[test]
    fn resized_head_is_fresh_while_encoder_is_loaded() {
        let config = bert_json();
        let tensors = checkpoint_tensors(&config);
        let dir = tempfile::TempDir::new().unwrap();
        write_checkpoint(dir.path(), &config, &tensors);

        let model = BertClassifier::load_trainable(dir.path(), Some(3), &Device::Cpu).unwrap();
        assert_eq!(model.num_labels(), 3);
        assert_eq!(model.logits(&batch(0)).unwrap().dims(), &[2, 3]);
        assert_eq!(var(&model, "classifier.weight").dims(), &[3, HIDDEN]);

        for name in ["bert.embeddings.word_embeddings.weight", "bert.encoder.layer.0.output.dense.weight", "bert.pooler.dense.weight"] {
            let loaded = var(&model, name).flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let expected = tensors[name].flatten_all().unwrap().to_vec1::<f32>().unwrap();
            assert_eq!(loaded, expected, "{name} was not loaded from the checkpoint");
        }
    }

    #[test]
    fn save_then_load_gives_identical_logits() {
        let src = checkpoint(bert_json());
        let model = BertClassifier::load_trainable(src.path(), None, &Device::Cpu).unwrap();

        let out = tempfile::TempDir::new().unwrap();
        model.save(out.path()).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.path().join("config.json")).unwrap()).unwrap();
        assert_eq!(saved["id2label"]["1"], "toxic");

        let frozen = BertClassifier::load_frozen(out.path(), &Device::Cpu).unwrap();
        let again = BertClassifier::load_trainable(out.path(), None, &Device::Cpu).unwrap();
        assert_close(&logits(&model, 0), &logits(&frozen, 0));
        assert_close(&logits(&model, 0), &logits(&again, 0));
    }

    #[test]
    fn frozen_classifier_cannot_be_saved() {
        let src = checkpoint(bert_json());
        let frozen = BertClassifier::load_frozen(src.path(), &Device::Cpu).unwrap();
        let out = tempfile::TempDir::new().unwrap();
        assert!(matches!(frozen.save(out.path()), Err(CoreError::Unsupported(_))));
    }

    #[test]
    fn missing_encoder_tensor_is_an_error() {
        let config = bert_json();
        let mut tensors = checkpoint_tensors(&config);
        tensors.remove("bert.encoder.layer.0.output.dense.weight");
        let dir = tempfile::TempDir::new().unwrap();
        write_checkpoint(dir.path(), &config, &tensors);

        assert!(BertClassifier::load_frozen(dir.path(), &Device::Cpu).is_err());
        let err = BertClassifier::load_trainable(dir.path(), None, &Device::Cpu).err().unwrap();
        assert!(matches!(err, CoreError::Config { .. }), "{err}");
    }

    #[test]
    fn unprefixed_checkpoint_loads() {
        let config = bert_json();
        let tensors: HashMap<String, Tensor> = checkpoint_tensors(&config)
            .into_iter()
            .map(|(k, v)| (k.strip_prefix("bert.").map(String::from).unwrap_or(k), v))
            .collect();
        let dir = tempfile::TempDir::new().unwrap();
        write_checkpoint(dir.path(), &config, &tensors);

        let frozen = BertClassifier::load_frozen(dir.path(), &Device::Cpu).unwrap();
        let trainable = BertClassifier::load_trainable(dir.path(), None, &Device::Cpu).unwrap();
        assert_close(&logits(&frozen, 0), &logits(&trainable, 0));
        assert!(trainable.varmap.as_ref().unwrap().data().lock().unwrap().contains_key("pooler.dense.weight"));
    }

    #[test]
    fn roberta_positions_start_after_padding_index() {
        let config = roberta_json();
        let tensors = checkpoint_tensors(&config);
        let dir = checkpoint_with(&config, &tensors);
        let reference = BertClassifier::load_frozen(dir.path(), &Device::Cpu).unwrap();

        // With padding_idx = 1, real tokens use positions 2.. and padding uses
        // position 1, so row 0 of the position table is never read.
        let mut altered = tensors.clone();
        let name = "roberta.embeddings.position_embeddings.weight";
        let table = &tensors[name];
        let rows = table.dim(0).unwrap();
        let poisoned = Tensor::full(100f32, (1, HIDDEN), &Device::Cpu).unwrap();
        altered.insert(name.to_string(), Tensor::cat(&[&poisoned, &table.narrow(0, 1, rows - 1).unwrap()], 0).unwrap());
        let dir = checkpoint_with(&config, &altered);
        let model = BertClassifier::load_frozen(dir.path(), &Device::Cpu).unwrap();

        assert_close(&logits(&reference, 1), &logits(&model, 1));
    }

    fn checkpoint_with(config: &serde_json::Value, tensors: &HashMap<String, Tensor>) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        write_checkpoint(dir.path(), config, tensors);
        dir
    }

    #[test]
    fn unknown_model_type_is_unsupported() {
        let mut config = bert_json();
        let tensors = checkpoint_tensors(&config);
        config["model_type"] = serde_json::json!("gpt2");
        let dir = checkpoint_with(&config, &tensors);
        assert!(matches!(BertClassifier::load_frozen(dir.path(), &Device::Cpu), Err(CoreError::Unsupported(_))));
    }
}
