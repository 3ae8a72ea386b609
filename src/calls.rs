//! Oracle call contracts with their local fallbacks.
//!
//! Every call except structure proposal recovers from oracle failure with a
//! fixed or locally built answer, so the state machine always has a defined
//! next state.

use crate::error::OracleError;
use crate::oracle::TextOracle;
use crate::prompts::{self, OracleReply, OracleRequest};
use tracing::{debug, warn};

async fn run(oracle: &dyn TextOracle, req: &OracleRequest) -> Result<String, OracleError> {
    debug!(
        "Oracle '{}' call: system='{}', prompt_len={}, temperature={}",
        oracle.name(),
        req.system,
        req.prompt.len(),
        req.temperature
    );
    let text = oracle.generate(req.system, &req.prompt, req.temperature).await?;
    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

/// Result of extracting one section from the combined source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionExtraction {
    /// Normalized paragraph; empty when the source has nothing for the section
    Found(String),
    /// The oracle failed; carries the user-facing message
    Failed(String),
}

impl SectionExtraction {
    pub fn text(&self) -> &str {
        match self {
            SectionExtraction::Found(text) => text,
            SectionExtraction::Failed(_) => "",
        }
    }
}

pub async fn extract_section(oracle: &dyn TextOracle, title: &str, source: &str) -> SectionExtraction {
    match run(oracle, &prompts::extract_section(title, source)).await {
        Ok(text) => SectionExtraction::Found(prompts::normalize_extraction(&text)),
        Err(e) => {
            warn!("Extraction of section '{}' failed: {}", title, e);
            SectionExtraction::Failed(prompts::extraction_failed(title))
        }
    }
}

/// Structure proposal has no fallback; failures reach the caller
pub async fn propose_structure(
    oracle: &dyn TextOracle,
    source: &str,
    feedback: Option<&str>,
) -> Result<String, OracleError> {
    let text = run(oracle, &prompts::propose_structure(source, feedback)).await?;
    Ok(text.trim().to_string())
}

pub async fn initial_question(oracle: &dyn TextOracle, source: &str, structure: &str) -> String {
    match run(oracle, &prompts::initial_question(source, structure)).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("Initial question failed: {}", e);
            prompts::INITIAL_QUESTION_FALLBACK.to_string()
        }
    }
}

/// Polish a draft against the original. Falls back to the draft unchanged.
pub async fn polish_section(
    oracle: &dyn TextOracle,
    original: &str,
    draft: &str,
    title: &str,
) -> (OracleReply, bool) {
    match run(oracle, &prompts::polish(original, draft, title)).await {
        Ok(text) => {
            let reply = prompts::parse_reply(&text);
            if reply.primary.is_empty() {
                warn!("Polish of '{}' returned only a follow-up; keeping draft", title);
                (OracleReply { primary: draft.to_string(), followup: reply.followup }, false)
            } else {
                (reply, true)
            }
        }
        Err(e) => {
            warn!("Polish of '{}' failed: {}", title, e);
            (
                OracleReply {
                    primary: draft.to_string(),
                    followup: None,
                },
                false,
            )
        }
    }
}

/// Suggestions comparing original and polished text. Skips the oracle when
/// there is no original to compare against.
pub async fn improvement_suggestions(oracle: &dyn TextOracle, original: &str, polished: &str) -> String {
    if original.trim().is_empty() {
        return prompts::NOTHING_TO_COMPARE.to_string();
    }
    match run(oracle, &prompts::suggestions(original, polished)).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("Suggestions failed: {}", e);
            prompts::SUGGESTIONS_FALLBACK.to_string()
        }
    }
}

pub async fn generate_references(oracle: &dyn TextOracle, article: &str) -> String {
    match run(oracle, &prompts::references(article)).await {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            warn!("Reference generation failed: {}", e);
            prompts::REFERENCES_FALLBACK.to_string()
        }
    }
}

/// Improve a free-form chat answer; falls back to the message itself
pub async fn compose_passage(
    oracle: &dyn TextOracle,
    message: &str,
    source: &str,
    current: &str,
    structure: Option<&str>,
) -> OracleReply {
    let fallback = || OracleReply {
        primary: message.trim().to_string(),
        followup: None,
    };
    match run(oracle, &prompts::compose(message, source, current, structure)).await {
        Ok(text) => {
            let reply = prompts::parse_reply(&text);
            if reply.primary.is_empty() {
                fallback()
            } else {
                reply
            }
        }
        Err(e) => {
            warn!("Compose failed: {}", e);
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;

    #[tokio::test]
    async fn test_suggestions_skip_oracle_without_original() {
        let oracle = MockOracle::new().otherwise("should not be used");
        let out = improvement_suggestions(&oracle, "  ", "polished").await;
        assert_eq!(out, prompts::NOTHING_TO_COMPARE);
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_polish_falls_back_to_draft() {
        let oracle = MockOracle::new();
        let (reply, polished) = polish_section(&oracle, "orig", "My version", "Problem").await;
        assert_eq!(reply.primary, "My version");
        assert!(!polished);
    }

    #[tokio::test]
    async fn test_extraction_normalizes_sentinel() {
        let oracle = MockOracle::new().otherwise(prompts::NOT_FOUND_SENTINEL);
        let out = extract_section(&oracle, "Hypothesis", "text").await;
        assert_eq!(out, SectionExtraction::Found(String::new()));
    }

    #[tokio::test]
    async fn test_extraction_failure_carries_message() {
        let oracle = MockOracle::new();
        let out = extract_section(&oracle, "Hypothesis", "text").await;
        assert_eq!(out.text(), "");
        assert!(matches!(out, SectionExtraction::Failed(msg) if msg.contains("Hypothesis")));
    }

    #[tokio::test]
    async fn test_blank_reply_counts_as_failure() {
        let oracle = MockOracle::new().otherwise("   ");
        let refs = generate_references(&oracle, "article").await;
        assert_eq!(refs, prompts::REFERENCES_FALLBACK);
    }

    #[tokio::test]
    async fn test_references_drop_blank_lines() {
        let oracle = MockOracle::new().otherwise("A (2020).\n\n  B (2021).  \n");
        let refs = generate_references(&oracle, "article").await;
        assert_eq!(refs, "A (2020).\nB (2021).");
    }
}
