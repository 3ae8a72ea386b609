//! Text transformation oracle: the hosted model behind every generation call

use crate::error::OracleError;
use crate::prompts;
use async_trait::async_trait;
use std::sync::Mutex;

/// Trait for pluggable text generation backends
#[async_trait]
pub trait TextOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generate a full response. Partial output is never surfaced.
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, OracleError>;
}

/// A call observed by [`MockOracle`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: f32,
}

impl RecordedCall {
    fn mentions(&self, needle: &str) -> bool {
        self.system_instruction.contains(needle) || self.prompt.contains(needle)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Scripted oracle for tests and offline runs.
///
/// Rules are checked in insertion order; the first rule whose needle occurs
/// in the system instruction or the prompt answers the call.
pub struct MockOracle {
    rules: Mutex<Vec<(String, Reply)>>,
    otherwise: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    /// Oracle that fails every call not covered by a rule
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            otherwise: Reply::Fail("no scripted response".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls mentioning `needle` with `text`
    pub fn on(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.push_rule(needle.into(), Reply::Text(text.into()));
        self
    }

    /// Fail calls mentioning `needle`
    pub fn failing_on(self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let reason = format!("scripted failure for '{}'", needle);
        self.push_rule(needle, Reply::Fail(reason));
        self
    }

    /// Answer every unmatched call with `text`
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.otherwise = Reply::Text(text.into());
        self
    }

    /// Replace (or add) the rule for `needle` on a live oracle
    pub fn respond(&self, needle: &str, text: impl Into<String>) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        rules.retain(|(n, _)| n != needle);
        rules.insert(0, (needle.to_string(), Reply::Text(text.into())));
    }

    /// Deterministic answers for running the service without a model
    pub fn offline() -> Self {
        Self::new()
            .on(prompts::SYSTEM_EXTRACT, prompts::NOT_FOUND_SENTINEL)
            .on(
                prompts::SYSTEM_STRUCTURE,
                "# Proposed structure\n## Introduction\n- Problem and motivation\n## Method\n- Design and data\n## Discussion\n- Findings and limitations",
            )
            .on(prompts::SYSTEM_INITIAL_QUESTION, prompts::INITIAL_QUESTION_FALLBACK)
            .on(prompts::SYSTEM_SUGGESTIONS, "- Consider stating your main claim in the first sentence.\n- Make sure every figure from the source is kept.")
            .on(prompts::SYSTEM_REFERENCES, "Creswell, J. W., & Creswell, J. D. (2018). Research design (5th ed.). SAGE.")
            .otherwise("(offline mode: no model configured)")
    }

    fn push_rule(&self, needle: String, reply: Reply) {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((needle, reply));
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of received calls mentioning `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.mentions(needle))
            .count()
    }
}

#[async_trait]
impl TextOracle for MockOracle {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, OracleError> {
        let call = RecordedCall {
            system_instruction: system_instruction.to_string(),
            prompt: prompt.to_string(),
            temperature,
        };

        let reply = {
            let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            rules
                .iter()
                .find(|(needle, _)| call.mentions(needle))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| self.otherwise.clone())
        };

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(reason) => Err(OracleError::Scripted(reason)),
        }
    }
}
