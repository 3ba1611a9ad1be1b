use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Result alias for errors emitted by the analysis core.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Structured error type for wearleak subsystems.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The program model handed to the analysis is malformed.
    #[error("invalid program model: {0}")]
    Model(String),

    /// The analysis reached a state that a well-formed SSA body cannot produce.
    #[error("internal consistency violation: {0}")]
    Consistency(String),

    /// Framework classes the lifecycle model depends on are missing or phantom.
    #[error("target program looks obfuscated: {0}")]
    Obfuscated(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AnalysisError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn obfuscated(msg: impl Into<String>) -> Self {
        Self::Obfuscated(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for errors that abort a run because the analysis itself is broken.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::Obfuscated(_))
    }

    /// Convert to anyhow::Error for interop with anyhow-based code.
    pub fn into_anyhow(self) -> AnyhowError {
        AnyhowError::new(self)
    }
}

impl From<AnyhowError> for AnalysisError {
    fn from(err: AnyhowError) -> Self {
        AnalysisError::other(err.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::model(err.to_string())
    }
}

/// Convenience macro mirroring `anyhow::bail!` for consistency violations.
#[macro_export]
macro_rules! analysis_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::AnalysisError::consistency(format!($($arg)*)))
    };
}

/// Convenience macro mirroring `anyhow::ensure!`.
#[macro_export]
macro_rules! analysis_ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::analysis_bail!($($arg)*);
        }
    };
}
