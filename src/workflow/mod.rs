//! Workflow engines
//!
//! Each engine follows the same sequence for every operation:
//!
//! 1. **Validate** the actor-supplied input (nothing is loaded yet)
//! 2. **Load** the document and **guard** the transition
//! 3. **Commit** the new state with a version-checked replace
//! 4. **Project** the new state onto chat messages, best effort
//!
//! Steps 1 and 2 return errors and never write. Step 4 never fails the
//! operation: gateway failures come back as [`EffectWarning`]s alongside
//! the committed value.
//!
//! - [`BudgetEngine`]: six-step budget approval with rework and reject
//! - [`AttendanceService`]: check-in, breaks, check-out and reports
//! - [`LeaveService`]: pending → approved | rejected

pub mod attendance;
pub mod budget;
mod effects;
pub mod leave;
pub mod render;

pub use attendance::{AttendanceService, DayReport, ReportLine};
pub use budget::{BudgetAction, BudgetEngine, NewBudgetRequest, PaymentInput};
pub use leave::{LeaveInput, LeaveService};

use serde::Serialize;
use std::fmt;

/// A side effect that failed after its transition was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectWarning {
    /// What was attempted, e.g. "edit review message"
    pub effect: String,
    pub error: String,
}

impl fmt::Display for EffectWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.effect, self.error)
    }
}

/// Committed result of an operation plus any best-effort failures
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<EffectWarning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<EffectWarning>) -> Self {
        Self { value, warnings }
    }

    /// True when every side effect succeeded
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
