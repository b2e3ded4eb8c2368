use crate::error::{FunnelError, Result};
use serde::{Deserialize, Serialize};
use taxonav_gateway::SamplingConfig;

/// How stage 1 maps a model-returned name onto the canonical top-level list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L1MatchPolicy {
    /// Case-insensitive equality only
    Exact,
    /// Case-insensitive equality, then substring containment in either
    /// direction. Containment matches are logged as warnings.
    Containment,
}

/// What stage 3 does with an answer that holds no number and is not a
/// recognised non-answer (e.g. "The first one looks right").
///
/// Only digit-free replies are affected. A reply whose first number is not
/// an option (0 or above the candidate count) fails under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparseableFinalPolicy {
    /// Take the first candidate and log a warning
    FirstCandidate,
    /// Treat it like a non-answer
    Fail,
}

/// Model used for each stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageModels {
    pub summary: String,
    pub top_level: String,
    pub leaf: String,
    pub final_selection: String,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            summary: "gpt-4.1-nano".to_string(),
            top_level: "gpt-4.1-nano".to_string(),
            leaf: "gpt-4.1-nano".to_string(),
            final_selection: "gpt-4.1-mini".to_string(),
        }
    }
}

impl StageModels {
    /// Same model for every stage
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            summary: model.clone(),
            top_level: model.clone(),
            leaf: model.clone(),
            final_selection: model,
        }
    }
}

/// Tunables of the classification funnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    /// Candidates presented per stage-2 call
    pub batch_size: usize,

    /// The "up to N" in the stage-2 prompt; replies are not truncated to it
    pub max_selections_per_batch: usize,

    /// Top-level categories requested in stage 1 (1 or 2)
    pub top_level_picks: usize,

    /// Characters kept from the raw description when summarization fails
    pub summary_fallback_chars: usize,

    /// Reply length cap for the summary call
    pub summary_max_tokens: u32,

    /// Stage-2 batches of one branch in flight at once
    pub max_concurrent_batches: usize,

    pub l1_match: L1MatchPolicy,

    pub unparseable_final: UnparseableFinalPolicy,

    pub models: StageModels,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_selections_per_batch: 15,
            top_level_picks: 2,
            summary_fallback_chars: 400,
            summary_max_tokens: 100,
            max_concurrent_batches: 4,
            l1_match: L1MatchPolicy::Containment,
            unparseable_final: UnparseableFinalPolicy::FirstCandidate,
            models: StageModels::default(),
        }
    }
}

impl FunnelConfig {
    /// Strict validation: exact L1 matching and no default on unparseable
    /// final answers
    pub fn strict() -> Self {
        Self {
            l1_match: L1MatchPolicy::Exact,
            unparseable_final: UnparseableFinalPolicy::Fail,
            ..Default::default()
        }
    }

    /// One batch at a time; useful against rate-limited endpoints
    pub fn sequential() -> Self {
        Self {
            max_concurrent_batches: 1,
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FunnelError::invalid_config("batch_size must be > 0"));
        }
        if self.max_selections_per_batch == 0 {
            return Err(FunnelError::invalid_config(
                "max_selections_per_batch must be > 0",
            ));
        }
        if !(1..=2).contains(&self.top_level_picks) {
            return Err(FunnelError::invalid_config(format!(
                "top_level_picks must be 1 or 2, got {}",
                self.top_level_picks
            )));
        }
        if self.summary_fallback_chars == 0 {
            return Err(FunnelError::invalid_config(
                "summary_fallback_chars must be > 0",
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(FunnelError::invalid_config(
                "max_concurrent_batches must be > 0",
            ));
        }
        Ok(())
    }

    pub(crate) fn summary_sampling(&self) -> SamplingConfig {
        SamplingConfig::deterministic()
            .with_model(&self.models.summary)
            .with_max_tokens(self.summary_max_tokens)
    }

    pub(crate) fn top_level_sampling(&self) -> SamplingConfig {
        SamplingConfig::deterministic().with_model(&self.models.top_level)
    }

    pub(crate) fn leaf_sampling(&self) -> SamplingConfig {
        SamplingConfig::deterministic().with_model(&self.models.leaf)
    }

    pub(crate) fn final_sampling(&self) -> SamplingConfig {
        SamplingConfig::deterministic().with_model(&self.models.final_selection)
    }
}
