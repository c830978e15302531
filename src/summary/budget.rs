//! Adaptive per-batch token ceiling
//!
//! Learned reactively from the model's own capacity errors. The ceiling only
//! ever goes down; a restart is the only way back up.

use std::sync::Mutex;

/// Default starting ceiling
pub const DEFAULT_TOKEN_LIMIT: usize = 30_000;

/// Never shrink below this
pub const MIN_TOKEN_LIMIT: usize = 1_000;

/// Percentage of a ceiling we are willing to use
pub const SHRINK_PERCENT: usize = 90;

/// Record of one shrink, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetAdjustment {
    pub previous: usize,
    pub current: usize,
    pub reported: usize,
}

pub struct TokenBudget {
    current: Mutex<usize>,
    floor: usize,
    shrink_percent: usize,
}

impl TokenBudget {
    pub fn new(initial: usize) -> Self {
        Self::with_limits(initial, MIN_TOKEN_LIMIT, SHRINK_PERCENT)
    }

    pub fn with_limits(initial: usize, floor: usize, shrink_percent: usize) -> Self {
        Self {
            current: Mutex::new(initial),
            floor,
            shrink_percent: shrink_percent.clamp(1, 100),
        }
    }

    pub fn current(&self) -> usize {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn scaled(&self, value: usize) -> usize {
        value.saturating_mul(self.shrink_percent) / 100
    }

    /// React to a capacity error whose text reported `reported` tokens.
    ///
    /// Without a number there is nothing to go on and the ceiling is left
    /// alone (`None`). Otherwise the ceiling drops to 90% of the report, or,
    /// if it was already at or below that, to 90% of itself: the report is
    /// not trusted either. The result is clamped to the floor, but a ceiling
    /// that started below the floor is never raised to meet it.
    pub fn handle_capacity_error(&self, reported: Option<usize>) -> Option<BudgetAdjustment> {
        let reported = reported?;
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let previous = *current;

        let target = self.scaled(reported);
        let next = if previous <= target {
            self.scaled(previous)
        } else {
            target
        };
        let next = next.max(self.floor).min(previous);

        *current = next;
        Some(BudgetAdjustment {
            previous,
            current: next,
            reported,
        })
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}
