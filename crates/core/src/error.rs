use crate::classify::RangeError;

/// Result alias that carries the custom [`PulseError`] type.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Common error type for the core crate.
///
/// None of these are fatal to the pipeline. Range failures are absorbed by the
/// store; the variant exists so callers that want to propagate one (the CLI)
/// can do so with `?`.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Candidate value fell outside the accepted range.
    #[error(transparent)]
    Range(#[from] RangeError),
    /// The streaming transport failed or went away.
    #[error("stream connection failed: {0}")]
    Connectivity(String),
    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

impl PulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
