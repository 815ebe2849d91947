use thiserror::Error;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum QuantbotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Feature/window errors
    #[error(transparent)]
    Feature(#[from] FeatureError),

    // Model errors (malformed input, non-finite output)
    #[error("Model error: {0}")]
    Model(String),

    // Order validation errors (never sent to the exchange)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Risk sizing errors
    #[error("Invalid risk parameters: {0}")]
    InvalidRiskParameters(String),

    // Exchange errors (transient ones are retried before surfacing)
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for QuantbotError
pub type Result<T> = std::result::Result<T, QuantbotError>;

/// Errors produced while turning raw OHLCV history into feature windows.
///
/// These are recovered locally: a decision cycle that cannot build its
/// input degrades to Hold instead of propagating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Insufficient history: have {have} rows, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Shape mismatch: expected {expected} features per step, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Structured error from the exchange boundary.
///
/// `transient` marks failures worth retrying (timeouts, rate limits);
/// everything else (auth, invalid symbol, insufficient funds) surfaces
/// immediately.
#[derive(Error, Debug, Clone)]
#[error("Exchange error [{code}]: {message}")]
pub struct ExchangeError {
    pub code: String,
    pub message: String,
    pub transient: bool,
}

impl ExchangeError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            transient: false,
        }
    }

    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::transient("timeout", format!("no response after {elapsed_ms}ms"))
    }
}
