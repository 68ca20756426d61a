//! Architecture size presets for fresh LSTM students.
//!
//! | Preset  | Embedding | Hidden | ~Params (30k vocab) |
//! |---------|-----------|--------|---------------------|
//! | `small` | 64        | 128    | ~2M                 |
//! | `base`  | 128       | 256    | ~4.2M               |
//! | `large` | 256       | 512    | ~9M                 |
//!
//! The embedding table dominates the count, so the vocabulary of the teacher
//! tokenizer matters more than the preset.

use detox_core::LstmClassifierConfig;

use crate::error::{DistillError, DistillResult};

/// Student architecture size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentPreset {
    Small,
    Base,
    Large,
}

impl StudentPreset {
    /// Parse a user-supplied string (`"small"`, `"base"`, `"large"`).
    pub fn parse(s: &str) -> DistillResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" | "s" => Ok(Self::Small),
            "base" | "b" => Ok(Self::Base),
            "large" | "l" => Ok(Self::Large),
            other => Err(DistillError::config(format!(
                "Unknown student preset '{other}'. Valid values: small, base, large."
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Base => "base",
            Self::Large => "large",
        }
    }

    fn dims(&self) -> (usize, usize) {
        match self {
            Self::Small => (64, 128),
            Self::Base => (128, 256),
            Self::Large => (256, 512),
        }
    }

    /// Build the classifier config for this preset.
    ///
    /// `vocab_size` and `pad_token_id` come from the teacher tokenizer so the
    /// student reads the same token ids.
    pub fn lstm_config(&self, vocab_size: usize, pad_token_id: u32, num_labels: usize) -> LstmClassifierConfig {
        let (embed_dim, hidden_dim) = self.dims();
        LstmClassifierConfig { vocab_size, embed_dim, hidden_dim, num_labels, pad_token_id }
    }
}
