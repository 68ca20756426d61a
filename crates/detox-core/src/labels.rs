//! Toxicity labels and their validated normalisation.
//!
//! Source datasets encode the toxicity column inconsistently (`1`, `"toxic"`,
//! `"yes"`, `"0"`, …).  Every raw value goes through [`normalize_label`]
//! before it reaches a trainer; values outside the accepted vocabulary are
//! rejected instead of being silently mapped to non-toxic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Binary toxicity label.  The discriminant is the class index used by the
/// classifiers' logit vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    NonToxic = 0,
    Toxic = 1,
}

/// Raw values accepted as [`Label::Toxic`].
const TOXIC_VALUES: &[&str] = &["1", "toxic", "yes", "true"];

/// Raw values accepted as [`Label::NonToxic`].
const NON_TOXIC_VALUES: &[&str] = &[
    "0",
    "non-toxic",
    "nontoxic",
    "non_toxic",
    "not toxic",
    "no",
    "false",
    "clean",
];

impl Label {
    /// Class index of this label.
    pub fn class_id(self) -> u32 {
        self as u32
    }

    /// Inverse of [`Label::class_id`].
    pub fn from_class_id(id: u32) -> CoreResult<Self> {
        match id {
            0 => Ok(Self::NonToxic),
            1 => Ok(Self::Toxic),
            other => Err(CoreError::InvalidLabel { value: other.to_string(), row: None }),
        }
    }

    /// Human-readable name, matching the `id2label` map written on export.
    pub fn name(self) -> &'static str {
        match self {
            Self::NonToxic => "non-toxic",
            Self::Toxic => "toxic",
        }
    }

    /// The canonical numeric form written to normalised CSV files.
    pub fn as_csv_value(self) -> &'static str {
        match self {
            Self::NonToxic => "0",
            Self::Toxic => "1",
        }
    }

    /// `id2label` entries for a binary toxicity classifier.
    pub fn id2label() -> Vec<String> {
        vec![Self::NonToxic.name().to_string(), Self::Toxic.name().to_string()]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a raw label value to a [`Label`].
///
/// Matching is case-insensitive and ignores surrounding whitespace.  Numeric
/// values written as floats (`"1.0"`, `"0.0"`) are accepted because pandas
/// writes integer columns with missing values that way.
pub fn normalize_label(raw: &str) -> CoreResult<Label> {
    let value = raw.trim().to_lowercase();

    if TOXIC_VALUES.contains(&value.as_str()) || value == "1.0" {
        return Ok(Label::Toxic);
    }
    if NON_TOXIC_VALUES.contains(&value.as_str()) || value == "0.0" {
        return Ok(Label::NonToxic);
    }

    Err(CoreError::InvalidLabel { value: raw.to_string(), row: None })
}
