use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Funnel stage an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Summary,
    TopLevel,
    /// Leaves of the first selected top-level category
    LeavesFirst,
    /// Leaves of the second selected top-level category
    LeavesSecond,
    FinalSelection,
    Resolution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Summary => "summary",
            Self::TopLevel => "stage 1",
            Self::LeavesFirst => "stage 2A",
            Self::LeavesSecond => "stage 2B",
            Self::FinalSelection => "stage 3",
            Self::Resolution => "resolution",
        };
        f.write_str(label)
    }
}

/// Something noteworthy that happened while classifying one description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunnelEvent {
    /// A completion call failed after retries
    GatewayFailed { stage: Stage, error: String },
    /// A deterministic fallback replaced the model's answer
    FallbackUsed { stage: Stage, reason: String },
    /// The model named something outside the candidate set
    Hallucination { stage: Stage, value: String },
    /// A top-level name was accepted through substring containment
    ApproximateMatch {
        stage: Stage,
        value: String,
        matched: String,
    },
    /// A stage-2 batch produced nothing usable because its call failed
    BatchDropped {
        stage: Stage,
        batch: usize,
        error: String,
    },
    /// The final choice could not be mapped to a full path
    UnresolvedLeaf { leaf: String },
}

/// Optional receiver for per-request diagnostics, injected into the funnel.
///
/// Events are also written to the `log` facade; a sink is only needed when
/// the caller wants them as values.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: FunnelEvent);
}

/// Sink that keeps every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<FunnelEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Drain recorded events, e.g. between two classifications
    pub fn take(&self) -> Vec<FunnelEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn hallucinations(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, FunnelEvent::Hallucination { .. }))
            .count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: FunnelEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
