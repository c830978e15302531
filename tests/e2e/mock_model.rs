//! Mock language model for e2e tests
//!
//! Returns pre-scripted completions in order and records every prompt.

use anyhow::Result;
use daz_command::model::LanguageModel;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct MockModel {
    available: bool,
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            available: true,
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Queue a completion for the next call
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a failure for the next call
    pub fn queue_error(&self, message: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of events in each summarization prompt, skipping the smoke test
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.prompts()
            .iter()
            .filter(|p| p.contains("## New Repository Information"))
            .map(|p| p.matches("\nEVENT ").count())
            .collect()
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted response")),
        }
    }
}

/// A summary long enough to pass the response length check
pub fn long_summary(tag: &str) -> String {
    format!("{tag}: ") + &"The service keeps its sources under src/ and its tests under tests/. ".repeat(6)
}
