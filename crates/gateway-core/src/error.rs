//! Error types for the edge gateway.
//!
//! Errors stay internal to each component: every public boundary converts them
//! into a command status or a logged no-op, so these types mostly travel
//! between the transport seam and the code that reports on it.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the gateway crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    // Transport errors
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Module client is not connected")]
    NotConnected,

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Connect failed after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Payload codec error: {message}")]
    Codec { message: String },

    // Chunking errors
    #[error("Chunk budget too small: {max_message_bytes} byte messages leave {available} bytes after the envelope")]
    BudgetTooSmall {
        max_message_bytes: usize,
        available: usize,
    },

    #[error("Upload pipeline failed: {message}")]
    Upload { message: String },

    // Validation errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<base64::DecodeError> for GatewayError {
    fn from(err: base64::DecodeError) -> Self {
        GatewayError::Codec {
            message: err.to_string(),
        }
    }
}

impl GatewayError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GatewayError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a transport error from anything displayable.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        GatewayError::Transport {
            message: message.to_string(),
            cause: None,
        }
    }

    /// Map to the numeric status used in command responses.
    ///
    /// - 400: caller supplied bad parameters
    /// - 503: no live module client
    /// - 504: a bounded wait ran out
    /// - 500: everything else
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidParams { .. } => 400,
            GatewayError::NotConnected => 503,
            GatewayError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Check if a failed connect attempt is worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. }
                | GatewayError::Timeout(_)
                | GatewayError::NotConnected
                | GatewayError::Io { .. }
        )
    }
}
