//! Pool metrics
//!
//! Emitted through the `metrics` facade; without an installed recorder these
//! calls are no-ops.
//!
//! - `pool_selections_total` (counter): label `outcome` (available, fallback, empty)
//! - `pool_account_errors_total` (counter): label `classification`
//! - `pool_account_successes_total` (counter)

use crate::classify::ErrorClass;

/// How a selection call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// An account passed the health check
    Available,
    /// No account was healthy; the one closest to leaving cooldown was returned
    Fallback,
    /// Nothing to select from
    Empty,
}

impl SelectionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SelectionOutcome::Available => "available",
            SelectionOutcome::Fallback => "fallback",
            SelectionOutcome::Empty => "empty",
        }
    }
}

pub fn record_selection(outcome: SelectionOutcome) {
    metrics::counter!("pool_selections_total", "outcome" => outcome.label()).increment(1);
}

pub fn record_account_error(class: ErrorClass) {
    metrics::counter!("pool_account_errors_total", "classification" => class.label())
        .increment(1);
}

pub fn record_account_success() {
    metrics::counter!("pool_account_successes_total").increment(1);
}
