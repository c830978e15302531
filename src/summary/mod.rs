//! Asynchronous session summarization
//!
//! Events are folded into each session's running summary by one background
//! worker, batching consecutive same-session events under an adaptive token
//! budget.

mod budget;
mod clean;
mod format;
mod generator;
mod queue;
mod tokens;
mod worker;

pub use budget::{BudgetAdjustment, TokenBudget};
pub use clean::clean_response;
pub use format::{build_prompt, format_event, format_events};
pub use generator::{
    GenerationResult, SummaryGenerator, extract_context_length, is_capacity_error,
};
pub use queue::{Batch, SummaryTask, WorkQueue, collect_batch};
pub use tokens::{estimate_tokens, truncate_with_indication};
pub use worker::{SummaryService, WorkerError, WorkerState};
