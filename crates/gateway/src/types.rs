use serde::{Deserialize, Serialize};

/// Sampling parameters sent with every completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on reply length, `None` leaves it to the service
    pub max_tokens: Option<u32>,
    /// Model override; `None` uses the gateway's default model
    pub model: Option<String>,
}

impl SamplingConfig {
    /// Zero-randomness sampling. Repeated identical calls should produce
    /// identical replies, though the service does not guarantee it.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.0,
            max_tokens: None,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::deterministic()
    }
}

/// One self-contained completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub sampling: SamplingConfig,
}

impl CompletionRequest {
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            sampling,
        }
    }
}
