//! Background summarization worker
//!
//! A single tokio task drains the [`WorkQueue`], grows each task into a
//! same-session [`Batch`](super::Batch) under the current token budget, and
//! overwrites that session's summary when the model answers. Producers only
//! ever push; they never wait on the model.
//!
//! Lifecycle: `NotStarted -> Initializing -> Ready | Failed | Skipped`.
//! `Skipped` means the model endpoint could not be reached at all;
//! `Failed` means it answered the smoke test badly. In both terminal
//! non-ready states enqueues are dropped.

use super::budget::TokenBudget;
use super::generator::{GenerationResult, SummaryGenerator, extract_context_length};
use super::queue::{SummaryTask, WorkQueue};
use crate::config::SummaryConfig;
use crate::event::{Event, unix_now};
use crate::logging;
use crate::model::LanguageModel;
use crate::session::{LlmInteraction, SessionStore};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Initializing,
    Ready,
    Failed(String),
    Skipped,
}

impl WorkerState {
    /// Past initialization, one way or the other
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_) | Self::Skipped)
    }

    /// New tasks will be processed eventually
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Initializing | Self::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Summary worker still initializing after {0:?}")]
    InitTimeout(Duration),

    #[error("Summary worker failed to initialize: {0}")]
    InitFailed(String),
}

struct Inner {
    generator: SummaryGenerator,
    store: SessionStore,
    queue: WorkQueue,
    budget: TokenBudget,
    state: watch::Sender<WorkerState>,
    started: AtomicBool,
    enabled: bool,
    max_retries: usize,
    drain_poll: Duration,
}

/// Handle to the summarization pipeline. Clones share one worker.
#[derive(Clone)]
pub struct SummaryService {
    inner: Arc<Inner>,
}

impl SummaryService {
    pub fn new(config: &SummaryConfig, model: Arc<dyn LanguageModel>, store: SessionStore) -> Self {
        let generator = SummaryGenerator::new(model)
            .with_limits(config.min_response_chars, config.detail_char_cap);
        let budget = TokenBudget::with_limits(
            config.initial_token_limit,
            config.min_token_limit,
            config.shrink_percent,
        );
        let (state, _) = watch::channel(WorkerState::NotStarted);

        Self {
            inner: Arc::new(Inner {
                generator,
                store,
                queue: WorkQueue::new(),
                budget,
                state,
                started: AtomicBool::new(false),
                enabled: config.enabled,
                max_retries: config.max_retries.max(1),
                drain_poll: config.drain_poll(),
            }),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.state.borrow().clone()
    }

    /// Spawn the worker. Later calls do nothing. Must run inside a tokio runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.inner.enabled {
            logging::info("Summary worker disabled by configuration");
            self.inner.set_state(WorkerState::Skipped);
            self.inner.queue.close();
            return;
        }

        self.inner.set_state(WorkerState::Initializing);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            logging::set_model(inner.generator.model_name());
            if inner.initialize().await {
                inner.run().await;
            }
        });
    }

    /// Wait for initialization to settle. `Skipped` counts as ready.
    pub async fn await_ready(&self, timeout: Duration) -> Result<(), WorkerError> {
        let mut rx = self.inner.state.subscribe();
        let settled = match tokio::time::timeout(timeout, rx.wait_for(WorkerState::is_settled)).await {
            Err(_) => return Err(WorkerError::InitTimeout(timeout)),
            Ok(Err(_)) => return Err(WorkerError::InitFailed("worker state channel closed".into())),
            Ok(Ok(state)) => state.clone(),
        };
        match settled {
            WorkerState::Failed(message) => Err(WorkerError::InitFailed(message)),
            _ => Ok(()),
        }
    }

    /// Fire-and-forget. Returns whether the task was queued.
    pub fn enqueue(&self, session_name: &str, old_summary: &str, event: Event) -> bool {
        let state = self.state();
        if !state.accepts_work() {
            logging::debug(&format!(
                "Summary worker {}; dropping {} event for {}",
                state.as_str(),
                event.kind,
                session_name
            ));
            return false;
        }
        // The worker may have shut the queue since the state was read
        self.inner
            .queue
            .push(SummaryTask::new(session_name, old_summary, event))
    }

    /// Nothing queued and no batch in flight
    pub fn is_queue_empty(&self) -> bool {
        !self.state().accepts_work() || self.inner.queue.is_empty()
    }

    /// Tasks waiting, excluding any batch currently with the model
    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    /// Poll until the queue drains. False if `timeout` passes first.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_queue_empty() {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.inner.drain_poll.min(deadline - now)).await;
        }
    }

    /// Current per-batch token ceiling
    pub fn token_limit(&self) -> usize {
        self.inner.budget.current()
    }
}

impl Inner {
    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Probe the model, then smoke-test it. True when the worker should serve.
    async fn initialize(&self) -> bool {
        if !self.generator.is_available().await {
            logging::warn("Language model unreachable; summaries disabled for this process");
            self.set_state(WorkerState::Skipped);
            self.queue.close();
            return false;
        }

        match self.generator.smoke_test().await {
            Ok(reply) => {
                logging::info(&format!(
                    "Summary worker ready ({}): {}",
                    self.generator.model_name(),
                    logging_preview(&reply)
                ));
                self.set_state(WorkerState::Ready);
                true
            }
            Err(message) => {
                logging::error(&format!("Summary worker smoke test failed: {message}"));
                self.set_state(WorkerState::Failed(message));
                let dropped = self.queue.close();
                if dropped > 0 {
                    logging::warn(&format!("Dropped {dropped} pending summary tasks"));
                }
                false
            }
        }
    }

    async fn run(&self) {
        loop {
            let first = self.queue.pop().await;
            self.process(first).await;
            self.queue.finish();
        }
    }

    /// Batch, generate, retry on capacity errors. Nothing escapes this function.
    async fn process(&self, first: SummaryTask) {
        let mut batch = self.queue.take_batch(first, self.budget.current());
        let session = batch.session_name.clone();
        let old_summary = batch.old_summary().to_string();
        logging::set_session(&session);
        logging::info(&format!(
            "Summarizing {} event(s), ~{} tokens (limit {})",
            batch.len(),
            batch.estimated_tokens,
            batch.budget
        ));

        for attempt in 1..=self.max_retries {
            let result = self.generator.generate(&old_summary, &batch.tasks).await;
            self.record_interaction(&session, &result);

            if result.success {
                match self.store.save_summary(&session, &result.summary) {
                    Ok(()) => logging::info(&format!(
                        "Summary updated from {} event(s) in {:.2}s",
                        batch.len(),
                        result.duration.as_secs_f64()
                    )),
                    Err(e) => {
                        logging::error(&format!("Failed to save summary: {e}"));
                        self.store
                            .log_error(&session, "save_summary", &e.to_string(), None);
                    }
                }
                return;
            }

            let error = result.error.clone().unwrap_or_default();
            let adjustment = if result.is_capacity_error() {
                self.budget
                    .handle_capacity_error(extract_context_length(&error))
            } else {
                None
            };

            let Some(adjustment) = adjustment else {
                logging::error(&format!("Summary generation failed: {error}"));
                self.store.log_error(
                    &session,
                    "generate_summary",
                    &error,
                    Some(json!({
                        "attempt": attempt,
                        "batch_size": batch.len(),
                        "token_estimate": result.token_estimate,
                    })),
                );
                return;
            };

            let rest = batch.shrink_to_first();
            logging::warn(&format!(
                "Context length exceeded (reported {}); token limit {} -> {}, retrying with 1 event, {} requeued",
                adjustment.reported,
                adjustment.previous,
                adjustment.current,
                rest.len()
            ));
            self.queue.requeue_front(rest);
        }

        let message = format!(
            "Gave up summarizing after {} attempts (token limit {})",
            self.max_retries,
            self.budget.current()
        );
        logging::error(&message);
        self.store.log_error(
            &session,
            "summary_worker",
            &message,
            Some(json!({ "batch_size": batch.len() })),
        );
    }

    fn record_interaction(&self, session: &str, result: &GenerationResult) {
        let interaction = LlmInteraction {
            timestamp: unix_now(),
            prompt: result.prompt.clone(),
            response: result.raw_response.clone(),
            duration: result.duration.as_secs_f64(),
            error: result.error.clone(),
            prompt_length: result.prompt.len(),
            response_length: result.raw_response.len(),
            model: self.generator.model_name().to_string(),
            token_limit: self.budget.current(),
        };
        self.store.log_llm_interaction(session, &interaction);
    }
}

fn logging_preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}
