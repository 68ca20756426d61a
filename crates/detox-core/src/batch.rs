//! Strongly-typed samples and batches.
//!
//! A [`Sample`] is one text encoded to a fixed length.  An [`EncodedBatch`]
//! groups samples that share that length, optionally with class labels, and
//! turns them into device tensors for a forward pass.

use candle_core::{Device, Tensor};

use crate::error::{CoreError, CoreResult};

/// One text with its fixed-length encoding.
///
/// `attention_mask[i]` is `1` exactly where `input_ids[i]` is a real token
/// and `0` on padding positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub text: String,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl Sample {
    /// Sequence length (identical for ids and mask).
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of non-padding positions.
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// A batch of equally-long samples plus optional labels.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    samples: Vec<Sample>,
    labels: Option<Vec<u32>>,
    seq_len: usize,
}

/// Device tensors for one batch.
#[derive(Debug, Clone)]
pub struct BatchTensors {
    /// `[batch, seq_len]`, `u32`.
    pub input_ids: Tensor,
    /// `[batch, seq_len]`, `u32`, 1 for real tokens.
    pub attention_mask: Tensor,
    /// `[batch]`, `u32` class indices.
    pub labels: Option<Tensor>,
}

impl EncodedBatch {
    /// Build a batch, checking that every sample has the same length, that the
    /// mask matches the ids, and that labels (if any) line up with samples.
    pub fn new(samples: Vec<Sample>, labels: Option<Vec<u32>>) -> CoreResult<Self> {
        let first = samples.first().ok_or_else(|| {
            CoreError::config("batch", "a batch must contain at least one sample")
        })?;
        let seq_len = first.len();

        for (i, s) in samples.iter().enumerate() {
            if s.input_ids.len() != seq_len || s.attention_mask.len() != seq_len {
                return Err(CoreError::ShapeMismatch(format!(
                    "sample {i}: ids={} mask={} but batch length is {seq_len}",
                    s.input_ids.len(),
                    s.attention_mask.len(),
                )));
            }
        }

        if let Some(ref l) = labels {
            if l.len() != samples.len() {
                return Err(CoreError::ShapeMismatch(format!(
                    "{} labels for {} samples",
                    l.len(),
                    samples.len()
                )));
            }
        }

        Ok(Self { samples, labels, seq_len })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn labels(&self) -> Option<&[u32]> {
        self.labels.as_deref()
    }

    /// Total number of real (non-padding) tokens in the batch.
    pub fn real_tokens(&self) -> usize {
        self.samples.iter().map(Sample::real_tokens).sum()
    }

    /// Materialise the batch on `device`.
    pub fn to_tensors(&self, device: &Device) -> CoreResult<BatchTensors> {
        let batch = self.samples.len();
        let ids: Vec<u32> = self.samples.iter().flat_map(|s| s.input_ids.iter().copied()).collect();
        let mask: Vec<u32> =
            self.samples.iter().flat_map(|s| s.attention_mask.iter().copied()).collect();

        let input_ids = Tensor::from_vec(ids, (batch, self.seq_len), device)?;
        let attention_mask = Tensor::from_vec(mask, (batch, self.seq_len), device)?;
        let labels = match &self.labels {
            Some(l) => Some(Tensor::new(l.as_slice(), device)?),
            None => None,
        };

        Ok(BatchTensors { input_ids, attention_mask, labels })
    }
}
