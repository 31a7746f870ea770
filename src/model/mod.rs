//! Workflow documents
//!
//! Every workflow entity is a single document, created by its first event,
//! replaced wholesale by later events and never deleted:
//! - [`BudgetRequest`]: six-step budget approval
//! - [`AttendanceRecord`]: one per user per calendar day
//! - [`LeaveRequest`]: two-state approval gate

pub mod attendance;
pub mod budget;
pub mod leave;

pub use attendance::{AttendanceRecord, AttendanceStatus, BreakInterval};
pub use budget::{
    Approval, BudgetRequest, BudgetStep, Completion, Confirmation, PartnerContent, PaymentInfo,
    RequestState, Rework, Role, RoleSlots,
};
pub use leave::{LeaveKind, LeaveRequest, LeaveStatus};

use crate::{Error, Result};

/// Reject blank required fields
pub(crate) fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Optional free-text field, blank maps to `None`
pub(crate) fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse a money amount in whole currency units.
///
/// Grouping separators (`,` `.` `_` and spaces) are accepted and ignored, so
/// `"1,500,000"` and `"1.500.000"` both parse to 1500000.
pub fn parse_amount(field: &str, value: &str) -> Result<u64> {
    let digits: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '_' | ' '))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "{} must be a whole number, got '{}'",
            field, value
        )));
    }
    digits
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{} is too large: '{}'", field, value)))
}

/// Format an amount with thousands separators
pub fn format_amount(amount: u64) -> String {
    let raw = amount.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
