use crate::error::{GatewayError, Result};
use crate::types::CompletionRequest;
use crate::CompletionGateway;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Outcome = std::result::Result<String, GatewayError>;

struct Rule {
    needle: String,
    outcome: Outcome,
}

#[derive(Default)]
struct Script {
    rules: Vec<Rule>,
    queue: VecDeque<Outcome>,
    fallback: Option<Outcome>,
    requests: Vec<CompletionRequest>,
}

/// Deterministic gateway for tests.
///
/// Replies are chosen in this order:
/// 1. the first rule whose needle occurs in the user prompt (rules are reusable),
/// 2. the next queued outcome,
/// 3. the fallback outcome, or an `InvalidResponse` error when none is set.
///
/// Every request is recorded, including the ones answered with an error.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failure
    pub fn fail(self, err: GatewayError) -> Self {
        self.push(Err(err))
    }

    /// Answer every request whose user prompt contains `needle`
    pub fn when(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rule(needle, Ok(text.into()))
    }

    /// Fail every request whose user prompt contains `needle`
    pub fn when_fail(self, needle: impl Into<String>, err: GatewayError) -> Self {
        self.rule(needle, Err(err))
    }

    /// Reply used once rules and queue are exhausted
    pub fn otherwise(self, text: impl Into<String>) -> Self {
        self.with_script(|script| script.fallback = Some(Ok(text.into())))
    }

    /// Failure used once rules and queue are exhausted
    pub fn otherwise_fail(self, err: GatewayError) -> Self {
        self.with_script(|script| script.fallback = Some(Err(err)))
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn push(self, outcome: Outcome) -> Self {
        self.with_script(|script| script.queue.push_back(outcome))
    }

    fn rule(self, needle: impl Into<String>, outcome: Outcome) -> Self {
        let needle = needle.into();
        self.with_script(|script| script.rules.push(Rule { needle, outcome }))
    }

    fn with_script(self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from the others
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        if let Some(rule) = script
            .rules
            .iter()
            .find(|rule| request.user.contains(&rule.needle))
        {
            return rule.outcome.clone();
        }

        if let Some(outcome) = script.queue.pop_front() {
            return outcome;
        }

        script.fallback.clone().unwrap_or_else(|| {
            Err(GatewayError::InvalidResponse(
                "scripted gateway has no reply left".to_string(),
            ))
        })
    }
}
