//! Pending summarization work
//!
//! Many producers push, one worker pops. Producers never wait on the model;
//! the only thing they contend on is the queue mutex for the length of a push.

use super::tokens::estimate_tokens;
use crate::event::Event;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// One event waiting to be folded into its session's summary
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTask {
    pub session_name: String,
    /// Summary as it was when the event was appended. Not re-read at dequeue.
    pub old_summary: String,
    pub event: Event,
}

impl SummaryTask {
    pub fn new(session_name: impl Into<String>, old_summary: impl Into<String>, event: Event) -> Self {
        Self {
            session_name: session_name.into(),
            old_summary: old_summary.into(),
            event,
        }
    }

    /// Size of what this task contributes to a prompt
    pub fn estimated_tokens(&self) -> usize {
        let event = &self.event;
        let mut text = self.old_summary.clone();
        if !event.inputs.is_empty() {
            text.push_str(&serde_json::to_string(&event.inputs).unwrap_or_default());
        }
        if !event.outputs.is_empty() {
            text.push_str(&serde_json::to_string(&event.outputs).unwrap_or_default());
        }
        text.push_str(&event.current_task);
        text.push_str(&event.summary_of_what_we_just_did);
        text.push_str(&event.summary_of_what_we_about_to_do);
        text.push_str(event.kind.as_str());
        estimate_tokens(&text)
    }
}

/// A contiguous same-session run of tasks, submitted as one model call
#[derive(Debug, Clone)]
pub struct Batch {
    pub session_name: String,
    pub tasks: Vec<SummaryTask>,
    pub estimated_tokens: usize,
    pub budget: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Baseline summary for the whole batch: the first task's snapshot
    pub fn old_summary(&self) -> &str {
        self.tasks
            .first()
            .map(|t| t.old_summary.as_str())
            .unwrap_or("")
    }

    /// Keep only the first task; hand back the rest in their original order
    pub fn shrink_to_first(&mut self) -> Vec<SummaryTask> {
        if self.tasks.len() <= 1 {
            return Vec::new();
        }
        let rest = self.tasks.split_off(1);
        self.estimated_tokens = self.tasks[0].estimated_tokens();
        rest
    }
}

/// Grow `first` into the largest same-session batch that fits `budget`.
///
/// Only the head of `pending` is ever examined: the first task for another
/// session ends the run, as does the first task that would overflow the
/// budget. Neither is removed, so everything left behind keeps its order.
/// `first` is always included, even when it alone exceeds the budget.
pub fn collect_batch(
    pending: &mut VecDeque<SummaryTask>,
    first: SummaryTask,
    budget: usize,
) -> Batch {
    let session_name = first.session_name.clone();
    let mut used = first.estimated_tokens();
    let mut tasks = vec![first];

    while let Some(next) = pending.front() {
        if next.session_name != session_name {
            break;
        }
        let tokens = next.estimated_tokens();
        if used + tokens > budget {
            break;
        }
        used += tokens;
        if let Some(task) = pending.pop_front() {
            tasks.push(task);
        }
    }

    Batch {
        session_name,
        tasks,
        estimated_tokens: used,
        budget,
    }
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<SummaryTask>,
    /// A popped task has not been reported finished yet
    in_flight: bool,
    /// Set by `close`; later pushes are refused
    closed: bool,
}

/// Unbounded FIFO of summary tasks
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-blocking; wakes the worker. False once the queue is closed.
    pub fn push(&self, task: SummaryTask) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.tasks.push_back(task);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Put tasks back at the head, keeping their relative order
    pub fn requeue_front(&self, tasks: Vec<SummaryTask>) {
        if tasks.is_empty() {
            return;
        }
        let mut state = self.lock();
        if state.closed {
            return;
        }
        for task in tasks.into_iter().rev() {
            state.tasks.push_front(task);
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Pop the head without waiting. The queue counts as busy until `finish`.
    pub fn try_pop(&self) -> Option<SummaryTask> {
        let mut state = self.lock();
        let task = state.tasks.pop_front()?;
        state.in_flight = true;
        Some(task)
    }

    /// Wait for the next task
    pub async fn pop(&self) -> SummaryTask {
        loop {
            let notified = self.notify.notified();
            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    /// Batch `first` with whatever same-session run sits at the head.
    /// The whole peek happens under one lock, so producers never observe a
    /// task that was taken out and put back.
    pub fn take_batch(&self, first: SummaryTask, budget: usize) -> Batch {
        let mut state = self.lock();
        collect_batch(&mut state.tasks, first, budget)
    }

    /// The popped task and its batch are done
    pub fn finish(&self) {
        self.lock().in_flight = false;
    }

    /// Queued tasks, not counting one being processed
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Nothing queued and nothing in flight
    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.tasks.is_empty() && !state.in_flight
    }

    /// Drop everything queued and refuse further work; returns how many
    /// tasks were discarded
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.tasks.len();
        state.tasks.clear();
        dropped
    }
}
