use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures of a completion call.
///
/// These are transport-level failures. An answer that is present but useless
/// (hallucinated, unparseable) is a successful call and never shows up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Completion call timed out after {0} ms")]
    Timeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("Gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the same request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }
}
