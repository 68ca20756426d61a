//! # detox-core
//!
//! Tokenization, toxicity labels, datasets, metrics, and the classifier
//! models shared by the detox trainers.
//!
//! ## Classifiers
//!
//! | Architecture | Weights | Struct |
//! |--------------|---------|--------|
//! | BERT / RoBERTa / DistilBERT sequence classifier | Safetensors + `config.json` | [`BertClassifier`] |
//! | Embedding + LSTM student | Safetensors + `student_config.json` | [`LstmClassifier`] |
//!
//! Both implement [`Classifier`]; trainable instances also implement
//! [`TrainableClassifier`].
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable CUDA GPU acceleration |
//! | `metal` | Enable Apple Metal GPU acceleration |

pub mod batch;
pub mod bert;
pub mod classifier;
pub mod dataset;
pub mod device;
pub mod error;
pub mod labels;
pub mod lstm;
pub mod metrics;
pub mod tokenizer;

pub use batch::{BatchTensors, EncodedBatch, Sample};
pub use bert::{Architecture, BertClassifier};
pub use classifier::{load_classifier, scores_from_logits, Classifier, ToxicityScore, TrainableClassifier};
pub use dataset::{merge_csv, split_train_val, LabeledText, TextDataset};
pub use device::{seed_device, select_device};
pub use error::{CoreError, CoreResult};
pub use labels::{normalize_label, Label};
pub use lstm::{LstmClassifier, LstmClassifierConfig};
pub use metrics::{ConfusionCounts, EpochMetrics, Metric, MetricsLog};
pub use tokenizer::{FixedLengthEncoder, Tokenizer};
