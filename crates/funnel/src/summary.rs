use crate::prompts;
use serde::Serialize;
use std::sync::Arc;
use taxonav_gateway::{CompletionGateway, CompletionRequest, GatewayError, SamplingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Generated,
    /// Local truncation of the raw description
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

/// Compresses a raw product description into a short canonical form.
///
/// Summarization is an optimization: when the call fails or comes back
/// empty, the first `fallback_chars` characters of the description are used.
pub struct SummaryGenerator {
    gateway: Arc<dyn CompletionGateway>,
    sampling: SamplingConfig,
    fallback_chars: usize,
}

impl SummaryGenerator {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        sampling: SamplingConfig,
        fallback_chars: usize,
    ) -> Self {
        Self {
            gateway,
            sampling,
            fallback_chars,
        }
    }

    pub async fn summarize(&self, description: &str) -> Summary {
        match self.try_summarize(description).await {
            Ok(text) => {
                log::info!(
                    "Generated summary ({} words): {}",
                    text.split_whitespace().count(),
                    preview(&text, 100)
                );
                Summary {
                    text,
                    source: SummarySource::Generated,
                }
            }
            Err(err) => {
                log::warn!("Summary unavailable ({err}); using truncated description");
                Summary {
                    text: self.fallback(description),
                    source: SummarySource::Fallback,
                }
            }
        }
    }

    async fn try_summarize(&self, description: &str) -> Result<String, GatewayError> {
        let request = CompletionRequest::new(
            prompts::SUMMARY_SYSTEM,
            prompts::summary(description),
            self.sampling.clone(),
        );
        let text = self.gateway.complete(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::InvalidResponse("empty summary".to_string()));
        }
        Ok(text.to_string())
    }

    /// First `fallback_chars` characters, with an ellipsis when cut
    pub fn fallback(&self, description: &str) -> String {
        let description = description.trim();
        if description.chars().count() <= self.fallback_chars {
            return description.to_string();
        }
        let cut: String = description.chars().take(self.fallback_chars).collect();
        format!("{cut}...")
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
