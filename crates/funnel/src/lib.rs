//! # Taxonomy Navigator: Classification Funnel
//!
//! Classifies a free-text product description into one leaf of a large flat
//! taxonomy by narrowing the candidate set in stages, each backed by one or
//! more calls to a [`CompletionGateway`].
//!
//! ## Pipeline
//!
//! ```text
//! description
//!     │
//!     ├──> SummaryGenerator            (1 call, falls back to truncation)
//!     │
//!     ├──> Stage 1: top-level pick     (1 call, validated against the L1 list)
//!     │
//!     ├──> Stage 2A/2B: leaf picks     (1 call per batch of 100, numeric answers)
//!     │      └─> BatchScheduler        (split, renumber, reassemble)
//!     │
//!     ├──> Stage 3: final pick         (skipped for 0 or 1 candidates)
//!     │
//!     └──> TaxonomyIndex::full_path_for_leaf
//!            └─> ClassificationResult::{Success, Failure}
//! ```
//!
//! Every model answer goes through [`ResponseValidator`] before it is used;
//! anything that is not an entry of the current candidate set is dropped.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taxonav_funnel::{FunnelConfig, StageFunnel};
//! use taxonav_gateway::{GatewaySettings, OpenAiGateway, RetryPolicy, RetryingGateway};
//! use taxonav_taxonomy::TaxonomyIndex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(TaxonomyIndex::from_file("data/taxonomy.en-US.txt")?);
//!     let gateway = RetryingGateway::new(
//!         OpenAiGateway::new(GatewaySettings::new("sk-..."))?,
//!         RetryPolicy::default(),
//!     );
//!     let funnel = StageFunnel::new(index, Arc::new(gateway), FunnelConfig::default())?;
//!
//!     let classification = funnel.classify("iPhone 14: Smartphone with camera").await;
//!     println!("{:?}", classification.result);
//!     Ok(())
//! }
//! ```

mod batch;
mod config;
mod diagnostics;
mod error;
mod funnel;
mod prompts;
mod result;
mod summary;
mod validator;

pub use batch::{Batch, BatchScheduler};
pub use config::{FunnelConfig, L1MatchPolicy, StageModels, UnparseableFinalPolicy};
pub use diagnostics::{DiagnosticSink, FunnelEvent, RecordingSink, Stage};
pub use error::{FunnelError, Result};
pub use funnel::StageFunnel;
pub use result::{Classification, ClassificationResult, StageTrace};
pub use summary::{Summary, SummaryGenerator, SummarySource};
pub use validator::{
    BatchSelection, FinalChoice, ResponseValidator, TopLevelValidation, NON_ANSWERS,
};

pub use taxonav_gateway::CompletionGateway;
