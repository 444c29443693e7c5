//! Custom error types for webpilot
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for webpilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// Decision oracle errors (empty or unusable responses)
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Browser automation errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Element extraction errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded wait ran out
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Screenshot decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// WebDriver endpoint could not be reached
    #[error("Cannot reach WebDriver at {0}. Start chromedriver or geckodriver first")]
    WebDriverNotReachable(String),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for webpilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create an oracle error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    /// Create a browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create an extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            secs,
        }
    }
}

impl From<fantoccini::error::CmdError> for PilotError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        Self::Browser(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for PilotError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        Self::Browser(format!("Failed to start WebDriver session: {}", err))
    }
}
