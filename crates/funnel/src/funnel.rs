use crate::batch::{Batch, BatchScheduler};
use crate::config::FunnelConfig;
use crate::diagnostics::{DiagnosticSink, FunnelEvent, Stage};
use crate::error::Result;
use crate::prompts;
use crate::result::{Classification, ClassificationResult, StageTrace};
use crate::summary::{preview, SummaryGenerator, SummarySource};
use crate::validator::{FinalChoice, ResponseValidator};
use std::collections::HashSet;
use std::sync::Arc;
use taxonav_gateway::{CompletionGateway, CompletionRequest, GatewayError};
use taxonav_taxonomy::TaxonomyIndex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

type BatchReply = std::result::Result<String, GatewayError>;

/// Runs the staged classification pipeline against a shared taxonomy.
///
/// One funnel serves any number of concurrent `classify` calls; it keeps no
/// per-request state. Dropping a `classify` future aborts its in-flight
/// batch calls and leaves nothing behind.
pub struct StageFunnel {
    index: Arc<TaxonomyIndex>,
    gateway: Arc<dyn CompletionGateway>,
    config: FunnelConfig,
    validator: ResponseValidator,
    scheduler: BatchScheduler,
    summarizer: SummaryGenerator,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl StageFunnel {
    pub fn new(
        index: Arc<TaxonomyIndex>,
        gateway: Arc<dyn CompletionGateway>,
        config: FunnelConfig,
    ) -> Result<Self> {
        config.validate()?;

        let summarizer = SummaryGenerator::new(
            Arc::clone(&gateway),
            config.summary_sampling(),
            config.summary_fallback_chars,
        );

        Ok(Self {
            validator: ResponseValidator::new(config.l1_match, config.unparseable_final),
            scheduler: BatchScheduler::new(config.batch_size),
            summarizer,
            index,
            gateway,
            config,
            sink: None,
        })
    }

    /// Forward diagnostics to `sink` in addition to the log
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn index(&self) -> &TaxonomyIndex {
        &self.index
    }

    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    /// Classify one free-text description.
    ///
    /// Never returns an error: every failure mode ends in
    /// [`ClassificationResult::Failure`].
    pub async fn classify(&self, description: &str) -> Classification {
        log::info!("Classifying: {}", preview(description.trim(), 100));

        let mut trace = StageTrace::default();
        let result = self.run(description, &mut trace).await;

        match &result {
            ClassificationResult::Success { path } => {
                log::info!(
                    "Classified as {path} ({} completion calls)",
                    trace.completion_calls
                )
            }
            ClassificationResult::Failure => {
                log::warn!(
                    "Could not classify ({} completion calls, {} hallucinations)",
                    trace.completion_calls,
                    trace.hallucinations
                )
            }
        }

        Classification { result, trace }
    }

    async fn run(&self, description: &str, trace: &mut StageTrace) -> ClassificationResult {
        let summary = self.summarizer.summarize(description).await;
        trace.completion_calls += 1;
        if summary.source == SummarySource::Fallback {
            self.emit(FunnelEvent::FallbackUsed {
                stage: Stage::Summary,
                reason: "summary unavailable, using truncated description".to_string(),
            });
        }
        trace.summary = Some(summary.text.clone());
        trace.summary_source = Some(summary.source);

        let top_level = self.select_top_level(&summary.text, trace).await;
        let Some(first_l1) = top_level.first() else {
            log::error!("{}: no top-level category available", Stage::TopLevel);
            return ClassificationResult::Failure;
        };

        let first = self
            .select_leaves(&summary.text, first_l1, &HashSet::new(), Stage::LeavesFirst, trace)
            .await;

        let second = match top_level.get(1) {
            Some(second_l1) => {
                let excluding: HashSet<String> = first.iter().cloned().collect();
                self.select_leaves(&summary.text, second_l1, &excluding, Stage::LeavesSecond, trace)
                    .await
            }
            None => {
                log::info!("{} skipped: only one top-level category selected", Stage::LeavesSecond);
                trace.second_branch_skipped = true;
                Vec::new()
            }
        };

        trace.leaves_first = first.clone();
        trace.leaves_second = second.clone();
        let candidates = BatchScheduler::reassemble([first, second]);
        trace.candidates = candidates.clone();

        let Some(choice) = self.final_selection(description, &candidates, trace).await else {
            return ClassificationResult::Failure;
        };
        trace.final_index = Some(choice);

        self.resolve(&candidates[choice])
    }

    /// Stage 1: pick up to `top_level_picks` categories from the full list.
    /// Falls back to the first categories in file order instead of failing.
    async fn select_top_level(&self, summary: &str, trace: &mut StageTrace) -> Vec<String> {
        let canonical = self.index.top_level_categories();
        if canonical.is_empty() {
            return Vec::new();
        }
        let picks = self.config.top_level_picks;

        log::info!(
            "{}: choosing {picks} of {} top-level categories",
            Stage::TopLevel,
            canonical.len()
        );

        let request = CompletionRequest::new(
            prompts::TOP_LEVEL_SYSTEM,
            prompts::top_level(summary, canonical, picks),
            self.config.top_level_sampling(),
        );
        trace.completion_calls += 1;

        let reply = match self.gateway.complete(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.emit(FunnelEvent::GatewayFailed {
                    stage: Stage::TopLevel,
                    error: err.to_string(),
                });
                return self.top_level_fallback(canonical, "completion call failed", trace);
            }
        };
        log::debug!("{} reply: {reply:?}", Stage::TopLevel);

        let validation = self
            .validator
            .validate_top_level(&reply, canonical, picks);

        for value in validation.hallucinated {
            trace.hallucinations += 1;
            self.emit(FunnelEvent::Hallucination {
                stage: Stage::TopLevel,
                value,
            });
        }
        for (value, matched) in validation.approximate {
            self.emit(FunnelEvent::ApproximateMatch {
                stage: Stage::TopLevel,
                value,
                matched,
            });
        }

        if validation.accepted.is_empty() {
            return self.top_level_fallback(canonical, "no valid category in reply", trace);
        }
        if validation.accepted.len() < picks {
            log::warn!(
                "{}: only {} of {picks} categories were valid",
                Stage::TopLevel,
                validation.accepted.len()
            );
        }

        log::info!("{}: selected {:?}", Stage::TopLevel, validation.accepted);
        trace.top_level = validation.accepted.clone();
        validation.accepted
    }

    fn top_level_fallback(
        &self,
        canonical: &[String],
        reason: &str,
        trace: &mut StageTrace,
    ) -> Vec<String> {
        let fallback: Vec<String> = canonical
            .iter()
            .take(self.config.top_level_picks)
            .cloned()
            .collect();

        self.emit(FunnelEvent::FallbackUsed {
            stage: Stage::TopLevel,
            reason: format!("{reason}; using {fallback:?}"),
        });
        trace.top_level_fallback = true;
        trace.top_level = fallback.clone();
        fallback
    }

    /// Stage 2 for one branch: offer every leaf of `top_level` (minus
    /// `excluding`) in numbered batches and collect the picks.
    ///
    /// A failed batch only loses its own candidates.
    async fn select_leaves(
        &self,
        summary: &str,
        top_level: &str,
        excluding: &HashSet<String>,
        stage: Stage,
        trace: &mut StageTrace,
    ) -> Vec<String> {
        let candidates = self.index.leaf_paths_for_l1(top_level, excluding);
        if candidates.is_empty() {
            log::warn!("{stage}: no leaves left under '{top_level}'");
            return Vec::new();
        }

        let batches = self.scheduler.split(candidates);
        log::info!(
            "{stage}: {} leaves under '{top_level}' in {} batch(es)",
            batches.iter().map(Batch::len).sum::<usize>(),
            batches.len()
        );

        let replies = self.dispatch_batches(summary, &batches).await;
        trace.completion_calls += batches.len();

        let mut picks = Vec::with_capacity(batches.len());
        for (batch, reply) in batches.iter().zip(replies) {
            let reply = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    trace.dropped_batches += 1;
                    self.emit(FunnelEvent::BatchDropped {
                        stage,
                        batch: batch.ordinal,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            log::debug!("{stage} batch {} reply: {reply:?}", batch.ordinal);

            let selection = self.validator.parse_batch_selection(&reply, batch.len());

            for number in selection.out_of_range {
                trace.hallucinations += 1;
                self.emit(FunnelEvent::Hallucination {
                    stage,
                    value: number.to_string(),
                });
            }

            let leaves = batch.resolve(&selection.picks);
            log::info!(
                "{stage} batch {}/{}: {} selected",
                batch.ordinal,
                batch.total,
                leaves.len()
            );
            picks.push(leaves);
        }

        let merged = BatchScheduler::reassemble(picks);
        log::info!("{stage}: {} unique leaves selected", merged.len());
        merged
    }

    /// Send every batch, at most `max_concurrent_batches` at a time.
    /// Replies come back in batch order.
    async fn dispatch_batches(&self, summary: &str, batches: &[Batch]) -> Vec<BatchReply> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let mut tasks = JoinSet::new();

        for (slot, batch) in batches.iter().enumerate() {
            let request = CompletionRequest::new(
                prompts::LEAF_SYSTEM,
                prompts::leaf_batch(summary, batch, self.config.max_selections_per_batch),
                self.config.leaf_sampling(),
            );
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => gateway.complete(&request).await,
                    Err(err) => Err(GatewayError::Transport(err.to_string())),
                };
                (slot, outcome)
            });
        }

        let mut replies: Vec<Option<BatchReply>> = batches.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => replies[slot] = Some(outcome),
                Err(err) => log::error!("Batch task did not complete: {err}"),
            }
        }

        replies
            .into_iter()
            .map(|reply| {
                reply.unwrap_or_else(|| {
                    Err(GatewayError::Transport("batch task did not complete".to_string()))
                })
            })
            .collect()
    }

    /// Stage 3: choose one of the merged candidates. Zero candidates fail and
    /// a single candidate is taken as-is, both without a call.
    async fn final_selection(
        &self,
        description: &str,
        candidates: &[String],
        trace: &mut StageTrace,
    ) -> Option<usize> {
        let stage = Stage::FinalSelection;
        match candidates.len() {
            0 => {
                log::error!("{stage}: no candidates from either branch");
                trace.final_skipped = true;
                None
            }
            1 => {
                log::info!("{stage} skipped: single candidate '{}'", candidates[0]);
                trace.final_skipped = true;
                Some(0)
            }
            count => {
                log::info!("{stage}: choosing among {count} candidates");
                let request = CompletionRequest::new(
                    prompts::FINAL_SYSTEM,
                    prompts::final_selection(description, candidates),
                    self.config.final_sampling(),
                );
                trace.completion_calls += 1;

                let reply = match self.gateway.complete(&request).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        self.emit(FunnelEvent::GatewayFailed {
                            stage,
                            error: err.to_string(),
                        });
                        return None;
                    }
                };
                log::debug!("{stage} reply: {reply:?}");

                let choice = self.validator.parse_final_choice(&reply, count);
                match choice {
                    FinalChoice::Selected(idx) => {
                        log::info!("{stage}: option {} '{}'", idx + 1, candidates[idx]);
                    }
                    FinalChoice::Defaulted => {
                        self.emit(FunnelEvent::FallbackUsed {
                            stage,
                            reason: format!("unparseable reply {reply:?}; using first candidate"),
                        });
                    }
                    FinalChoice::OutOfRange(number) => {
                        trace.hallucinations += 1;
                        self.emit(FunnelEvent::Hallucination {
                            stage,
                            value: number.to_string(),
                        });
                    }
                    FinalChoice::NonAnswer | FinalChoice::Unparseable => {
                        log::error!("{stage}: no usable selection in reply {reply:?}");
                    }
                }
                choice.index()
            }
        }
    }

    fn resolve(&self, leaf: &str) -> ClassificationResult {
        match self.index.full_path_for_leaf(leaf) {
            Some(path) => ClassificationResult::Success { path: path.clone() },
            None => {
                self.emit(FunnelEvent::UnresolvedLeaf {
                    leaf: leaf.to_string(),
                });
                ClassificationResult::Failure
            }
        }
    }

    fn emit(&self, event: FunnelEvent) {
        match &event {
            FunnelEvent::GatewayFailed { stage, error } => {
                log::error!("{stage}: completion failed: {error}")
            }
            FunnelEvent::FallbackUsed { stage, reason } => {
                log::warn!("{stage}: fallback: {reason}")
            }
            FunnelEvent::Hallucination { stage, value } => {
                log::warn!("{stage}: hallucination: {value:?} is not a candidate")
            }
            FunnelEvent::ApproximateMatch {
                stage,
                value,
                matched,
            } => log::warn!("{stage}: accepted {value:?} as '{matched}' by containment"),
            FunnelEvent::BatchDropped {
                stage,
                batch,
                error,
            } => log::error!("{stage}: batch {batch} dropped: {error}"),
            FunnelEvent::UnresolvedLeaf { leaf } => {
                log::error!("{}: no taxonomy path ends in '{leaf}'", Stage::Resolution)
            }
        }

        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }
}
