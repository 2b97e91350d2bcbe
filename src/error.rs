use thiserror::Error;

pub type Result<T> = std::result::Result<T, CardPressError>;

#[derive(Debug, Error)]
pub enum CardPressError {
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("asset error for '{source_name}': {message}")]
    AssetLoad {
        source_name: String,
        message: String,
    },

    #[error("measurement error: {0}")]
    Measurement(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("pipeline execution was cancelled")]
    Cancelled,

    #[error("background worker is not available")]
    WorkerUnavailable,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CardPressError {
    pub(crate) fn asset(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        CardPressError::AssetLoad {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CardPressError::Cancelled)
    }
}
