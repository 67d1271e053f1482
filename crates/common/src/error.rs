//! Error types shared across talkpic crates.

use std::path::PathBuf;

/// Top-level error type for talkpic operations.
///
/// The first four variants mirror the user-facing failure classes of an
/// animation session; the rest wrap lower-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TalkpicError {
    /// A required asset (image or audio track) has not been loaded.
    #[error("Input unavailable: {what}")]
    InputUnavailable { what: String },

    /// A manual region selection was rejected.
    #[error("Invalid selection: {message}")]
    SelectionInvalid { message: String },

    /// The encoder produced no output or a truncated one.
    #[error("Capture failed after {attempts} attempt(s) ({}): {message}", describe_bytes(.bytes))]
    CaptureFailure {
        message: String,
        bytes: Option<u64>,
        attempts: u32,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("Illegal state transition: {message}")]
    IllegalState { message: String },

    #[error("Detection error: {message}")]
    Detection { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TalkpicError.
pub type TalkpicResult<T> = Result<T, TalkpicError>;

fn describe_bytes(bytes: &Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{:.1} KB", *b as f64 / 1024.0),
        None => "no output".to_string(),
    }
}

impl TalkpicError {
    pub fn input_unavailable(what: impl Into<String>) -> Self {
        Self::InputUnavailable { what: what.into() }
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        Self::SelectionInvalid {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>, bytes: Option<u64>, attempts: u32) -> Self {
        Self::CaptureFailure {
            message: msg.into(),
            bytes,
            attempts,
        }
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState {
            message: msg.into(),
        }
    }

    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether retrying the same capture could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CaptureFailure { .. })
    }
}
