//! Error types for the earlybird-core crate.

use thiserror::Error;

/// Top-level error type for training orchestration.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Data source error: {0}")]
    Data(String),

    #[error("Metrics sink error: {0}")]
    Sink(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True for errors raised by misconfiguration rather than by a collaborator.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Figment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            TrainError::config("empty validation set").to_string(),
            "Configuration error: empty validation set"
        );
        assert_eq!(
            TrainError::sink("disk full").to_string(),
            "Metrics sink error: disk full"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: TrainError = io.into();
        assert!(matches!(err, TrainError::Io(_)));
        assert!(!err.is_config());
    }

    #[test]
    fn test_is_config() {
        assert!(TrainError::config("x").is_config());
        assert!(!TrainError::model("x").is_config());
    }
}
