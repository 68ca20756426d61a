use std::collections::HashMap;
use std::path::Path;

use tokenizers::models::wordlevel::WordLevel;
use tokenizers::normalizers::utils::Lowercase;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{
    AddedToken, PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer as HfTokenizer,
    TruncationDirection, TruncationParams, TruncationStrategy,
};
use tracing::debug;

use crate::batch::{EncodedBatch, Sample};
use crate::error::{CoreError, CoreResult};

/// Padding token used by [`Tokenizer::from_vocab`].
pub const PAD_TOKEN: &str = "[PAD]";
/// Unknown-word token used by [`Tokenizer::from_vocab`].
pub const UNK_TOKEN: &str = "[UNK]";

/// Thin wrapper around the Hugging Face `tokenizers` crate.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    inner: HfTokenizer,
    pad_token_id: u32,
    pad_token: String,
}

impl Tokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let inner = HfTokenizer::from_file(path)
            .map_err(|e| CoreError::Tokenizer(format!("{}: {e}", path.display())))?;
        Ok(Self::wrap(inner))
    }

    /// Build a word-level tokenizer over a fixed vocabulary.
    ///
    /// Text is lowercased and split on whitespace/punctuation.  Ids `0` and
    /// `1` are reserved for [`PAD_TOKEN`] and [`UNK_TOKEN`]; `words` follow in
    /// order, duplicates ignored.
    pub fn from_vocab<S: AsRef<str>>(words: &[S]) -> CoreResult<Self> {
        let mut vocab: HashMap<String, u32> = HashMap::new();
        vocab.insert(PAD_TOKEN.to_string(), 0);
        vocab.insert(UNK_TOKEN.to_string(), 1);
        for w in words {
            let w = w.as_ref().to_lowercase();
            let next = vocab.len() as u32;
            vocab.entry(w).or_insert(next);
        }

        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token(UNK_TOKEN.to_string())
            .build()
            .map_err(|e| CoreError::Tokenizer(format!("WordLevel build error: {e}")))?;

        let mut inner = HfTokenizer::new(model);
        inner.with_normalizer(Some(Lowercase));
        inner.with_pre_tokenizer(Some(Whitespace::default()));
        inner.add_special_tokens(&[
            AddedToken::from(PAD_TOKEN.to_string(), true),
            AddedToken::from(UNK_TOKEN.to_string(), true),
        ]);

        Ok(Self::wrap(inner))
    }

    fn wrap(inner: HfTokenizer) -> Self {
        let (pad_token, pad_token_id) = Self::find_pad_token(&inner);
        debug!(
            pad_token = %pad_token,
            pad_token_id,
            vocab_size = inner.get_vocab_size(true),
            "Tokenizer ready"
        );
        Self { inner, pad_token_id, pad_token }
    }

    /// Encode a text string to a sequence of token ids (no padding or truncation).
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> CoreResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode a sequence of token ids back to a string.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> CoreResult<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))
    }

    /// Build an encoder that truncates and right-pads every text to `max_len`.
    pub fn fixed_length(&self, max_len: usize) -> CoreResult<FixedLengthEncoder> {
        if max_len == 0 {
            return Err(CoreError::config("max_seq_len", "must be at least 1"));
        }

        let mut inner = self.inner.clone();
        inner
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| CoreError::Tokenizer(format!("truncation setup failed: {e}")))?;
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_len),
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: self.pad_token_id,
            pad_type_id: 0,
            pad_token: self.pad_token.clone(),
        }));

        Ok(FixedLengthEncoder { inner, max_len })
    }

    /// The padding token id.
    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    /// The size of the model vocabulary.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Look up the token id for an exact token string (e.g. `"[CLS]"`).
    pub fn token_id(&self, text: &str) -> Option<u32> {
        self.inner.token_to_id(text)
    }

    /// Write the tokenizer as `tokenizer.json` at `path`.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        self.inner
            .save(path, true)
            .map_err(|e| CoreError::Tokenizer(format!("cannot save {}: {e}", path.display())))
    }

    /// Padding token: an explicit pad token if the vocabulary has one,
    /// otherwise the end-of-sequence token, otherwise id 0.
    fn find_pad_token(tokenizer: &HfTokenizer) -> (String, u32) {
        if let Some(p) = tokenizer.get_padding() {
            return (p.pad_token.clone(), p.pad_id);
        }
        let vocab = tokenizer.get_vocab(true);
        for candidate in ["<pad>", PAD_TOKEN, "</s>", "<|endoftext|>", "[SEP]"] {
            if let Some(&id) = vocab.get(candidate) {
                return (candidate.to_string(), id);
            }
        }
        let token = tokenizer.id_to_token(0).unwrap_or_else(|| "<pad>".to_string());
        (token, 0)
    }
}

/// Encodes texts to exactly `max_len` positions.
///
/// Longer texts are truncated (special tokens are re-added after truncation,
/// so `[CLS] … [SEP]` style wrappers survive); shorter ones are padded on the
/// right with the pad id and a `0` attention mask.
#[derive(Debug, Clone)]
pub struct FixedLengthEncoder {
    inner: HfTokenizer,
    max_len: usize,
}

impl FixedLengthEncoder {
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Encode one text.
    pub fn encode(&self, text: &str) -> CoreResult<Sample> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;

        let sample = Sample {
            text: text.to_string(),
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        };

        if sample.input_ids.len() != self.max_len {
            return Err(CoreError::ShapeMismatch(format!(
                "encoded length {} != max_len {}",
                sample.input_ids.len(),
                self.max_len
            )));
        }
        Ok(sample)
    }

    /// Encode a group of texts into one batch, with optional class labels.
    pub fn encode_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        labels: Option<Vec<u32>>,
    ) -> CoreResult<EncodedBatch> {
        let samples = texts
            .iter()
            .map(|t| self.encode(t.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        EncodedBatch::new(samples, labels)
    }
}
