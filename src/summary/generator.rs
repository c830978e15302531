//! One summarization attempt: prompt, model call, cleanup, validation

use super::clean::clean_response;
use super::format::{DETAIL_CHAR_CAP, build_prompt, format_events};
use super::queue::SummaryTask;
use super::tokens::estimate_tokens;
use crate::model::LanguageModel;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Shorter cleaned responses are rejected as degenerate
pub const MIN_RESPONSE_CHARS: usize = 256;

const SMOKE_TEST_PROMPT: &str = "Please respond with exactly: 'LLM connection test successful'";

/// Outcome of one attempt. Never an `Err`: failures are data for the caller.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub success: bool,
    pub summary: String,
    pub error: Option<String>,
    pub prompt: String,
    pub raw_response: String,
    pub duration: Duration,
    pub token_estimate: usize,
}

impl GenerationResult {
    fn failed(error: impl Into<String>, prompt: String, raw: String, started: Instant) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            token_estimate: estimate_tokens(&prompt),
            prompt,
            raw_response: raw,
            duration: started.elapsed(),
            ..Default::default()
        }
    }

    /// The model rejected the prompt as too large
    pub fn is_capacity_error(&self) -> bool {
        self.error.as_deref().is_some_and(is_capacity_error)
    }
}

/// Capacity failures mention the context length somewhere in their text
pub fn is_capacity_error(error: &str) -> bool {
    error.to_lowercase().contains("context length")
}

/// First integer in an error message, taken as the model's reported ceiling.
///
/// Best effort: nothing checks that the number really is a token count.
pub fn extract_context_length(error: &str) -> Option<usize> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\b(\d+)\b").expect("number regex"));
    re.captures(error)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct SummaryGenerator {
    model: Arc<dyn LanguageModel>,
    min_response_chars: usize,
    detail_cap: usize,
}

impl SummaryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            min_response_chars: MIN_RESPONSE_CHARS,
            detail_cap: DETAIL_CHAR_CAP,
        }
    }

    pub fn with_limits(mut self, min_response_chars: usize, detail_cap: usize) -> Self {
        self.min_response_chars = min_response_chars;
        self.detail_cap = detail_cap;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn is_available(&self) -> bool {
        self.model.is_available().await
    }

    /// Send a trivial prompt. Any answer counts; an empty one does not.
    pub async fn smoke_test(&self) -> Result<String, String> {
        match self.model.complete(SMOKE_TEST_PROMPT).await {
            Ok(response) => {
                let cleaned = clean_response(&response);
                if cleaned.is_empty() {
                    Err("Model returned an empty response".to_string())
                } else {
                    Ok(cleaned)
                }
            }
            Err(e) => Err(format!("{e:#}")),
        }
    }

    /// Fold `tasks` into `old_summary` with one model call
    pub async fn generate(&self, old_summary: &str, tasks: &[SummaryTask]) -> GenerationResult {
        let started = Instant::now();
        let events_text = format_events(tasks, self.detail_cap);
        let prompt = build_prompt(old_summary, &events_text);

        let raw = match self.model.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => return GenerationResult::failed(format!("{e:#}"), prompt, String::new(), started),
        };

        let summary = clean_response(&raw).trim().to_string();
        let chars = summary.chars().count();
        if chars < self.min_response_chars {
            return GenerationResult::failed(
                format!("LLM response too short ({chars} chars)"),
                prompt,
                raw,
                started,
            );
        }

        GenerationResult {
            success: true,
            summary,
            error: None,
            token_estimate: estimate_tokens(&prompt),
            prompt,
            raw_response: raw,
            duration: started.elapsed(),
        }
    }
}
