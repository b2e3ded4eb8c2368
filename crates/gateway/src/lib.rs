//! # Taxonomy Navigator: Completion Gateway
//!
//! The only boundary between the classification funnel and a text-completion
//! service. Every call is stateless: one system instruction, one user prompt,
//! one sampling configuration, one text reply.
//!
//! ## Architecture
//!
//! ```text
//! StageFunnel
//!     │
//!     └──> dyn CompletionGateway
//!            ├─> RetryingGateway<G>   (timeout + bounded retries on transport errors)
//!            │      └─> OpenAiGateway (chat completions over HTTP)
//!            └─> ScriptedGateway      (deterministic double for tests)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use taxonav_gateway::{
//!     CompletionGateway, CompletionRequest, GatewaySettings, OpenAiGateway, RetryPolicy,
//!     RetryingGateway, SamplingConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> taxonav_gateway::Result<()> {
//!     let settings = GatewaySettings::new("sk-...");
//!     let gateway = RetryingGateway::new(OpenAiGateway::new(settings)?, RetryPolicy::default());
//!
//!     let request = CompletionRequest::new(
//!         "You are a product categorization assistant.",
//!         "Product: iPhone 14\n\nReturn one category per line:",
//!         SamplingConfig::deterministic(),
//!     );
//!     let reply = gateway.complete(&request).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

mod error;
mod openai;
mod retry;
mod scripted;
mod types;

use async_trait::async_trait;
use std::sync::Arc;

pub use error::{GatewayError, Result};
pub use openai::{GatewaySettings, OpenAiGateway, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use retry::{RetryPolicy, RetryingGateway};
pub use scripted::ScriptedGateway;
pub use types::{CompletionRequest, SamplingConfig};

/// Stateless text-completion capability.
///
/// Implementations must not carry context from one call into the next.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Produce one text reply for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[async_trait]
impl<G: CompletionGateway + ?Sized> CompletionGateway for Arc<G> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }
}
