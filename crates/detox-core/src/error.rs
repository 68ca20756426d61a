use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Invalid toxicity label '{value}'{}", location_suffix(.row))]
    InvalidLabel { value: String, row: Option<usize> },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unsupported model: {0}")]
    Unsupported(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::Config`] error.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config { field: field.into(), reason: reason.into() }
    }
}

fn location_suffix(row: &Option<usize>) -> String {
    match row {
        Some(r) => format!(" at row {r}"),
        None => String::new(),
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
