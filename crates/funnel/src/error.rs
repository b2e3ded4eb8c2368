use thiserror::Error;

/// Result type for funnel setup
pub type Result<T> = std::result::Result<T, FunnelError>;

/// Errors raised while setting up a funnel.
///
/// Classification itself never fails with an error; see
/// [`crate::ClassificationResult::Failure`].
#[derive(Error, Debug)]
pub enum FunnelError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl FunnelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
