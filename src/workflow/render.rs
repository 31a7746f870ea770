//! Message views
//!
//! Pure functions from a document snapshot to message text. Engines decide
//! *which* view goes where; this module only decides what it looks like.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::model::{
    format_amount, AttendanceRecord, BudgetRequest, LeaveRequest, LeaveStatus, PartnerContent,
    PaymentInfo,
};

/// First post into a channel alerts everyone in it
pub fn announce(text: &str) -> String {
    format!("@all\n{}", text)
}

fn row(label: &str, value: &str) -> String {
    format!("\n| {} | {} |", label, value)
}

/// Request summary table shared by every budget view
pub fn budget_info(req: &BudgetRequest) -> String {
    let mut out = String::from("#### Budget request\n| | |\n|:--|:--|");
    out += &row("Name", &req.name);
    out += &row("Partner", &req.partner);
    out += &row("Amount", &format_amount(req.amount));
    out += &row("Purpose", &req.purpose);
    out += &row("Deadline", &req.deadline.format("%Y-%m-%d").to_string());
    out
}

/// Summary plus a status line
pub fn budget_status(req: &BudgetRequest, status: &str) -> String {
    budget_info(req) + &row("Status", status)
}

/// Status line for the request's current step
pub fn step_status(req: &BudgetRequest) -> String {
    budget_status(
        req,
        &format!(
            "step {}/6: {}",
            req.current_step.number(),
            req.current_step.label()
        ),
    )
}

pub fn content_rows(content: &PartnerContent) -> String {
    let mut out = row("Post content", &content.text);
    out += &row("Post link", content.post_link.as_deref().unwrap_or("-"));
    out += &row("Page link", content.page_link.as_deref().unwrap_or("-"));
    out
}

pub fn payment_rows(payment: &PaymentInfo) -> String {
    let mut out = row("Recipient", &payment.recipient);
    out += &row("Bank account", &payment.account);
    out += &row("Bank", &payment.bank);
    out += &row("Payment amount", &format_amount(payment.amount));
    out
}

/// Status after the reviewer sent the content back
pub fn budget_returned(req: &BudgetRequest) -> String {
    let reason = req.rework.as_ref().map(|r| r.reason.as_str()).unwrap_or("");
    budget_status(req, &format!("returned for rework: {}", reason))
}

/// Final view shown on every message once finance completes
pub fn budget_completed(req: &BudgetRequest) -> String {
    let mut out = budget_info(req);
    if let Some(completion) = &req.completion {
        out += &row("Transaction", &completion.transaction_ref);
        if let Some(bill) = &completion.bill_ref {
            out += &row("Bill", bill);
        }
    }
    out + &row("Status", "completed")
}

/// Final view shown on every message once rejected
pub fn budget_rejected(req: &BudgetRequest) -> String {
    budget_status(
        req,
        &format!("rejected at step {}", req.current_step.number()),
    )
}

/// Whole seconds, printed like `1h 30m`
pub fn duration(d: Duration) -> String {
    let secs = u64::try_from(d.num_seconds()).unwrap_or(0);
    humantime::format_duration(std::time::Duration::from_secs(secs)).to_string()
}

pub fn clock_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%H:%M:%S").to_string()
}

pub fn check_in_post(record: &AttendanceRecord, offset: FixedOffset) -> String {
    let mut out = format!(
        "@{} checked in at {}",
        record.username,
        clock_time(record.check_in, offset)
    );
    if let Some(file_id) = &record.check_in_image {
        out += &format!("\n\n![check-in photo](/api/v4/files/{}/preview)", file_id);
    }
    out
}

pub fn break_start_reply(username: &str, at: DateTime<Utc>, reason: &str, offset: FixedOffset) -> String {
    let mut out = format!("@{} started a break at {}", username, clock_time(at, offset));
    if !reason.is_empty() {
        out += &format!(": {}", reason);
    }
    out
}

pub fn break_end_reply(username: &str, at: DateTime<Utc>, length: Duration, offset: FixedOffset) -> String {
    format!(
        "@{} is back at {} after {}",
        username,
        clock_time(at, offset),
        duration(length)
    )
}

pub fn check_out_reply(record: &AttendanceRecord, offset: FixedOffset) -> String {
    let end = record.check_out.unwrap_or(record.check_in);
    format!(
        "@{} checked out at {} (worked {}, breaks {})",
        record.username,
        clock_time(end, offset),
        duration(record.worked_time(end)),
        duration(record.break_time(end))
    )
}

fn leave_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn leave_status(req: &LeaveRequest) -> String {
    let by = req.decided_by_name.as_deref().unwrap_or("?");
    match req.status {
        LeaveStatus::Pending => "pending".to_string(),
        LeaveStatus::Approved => format!("approved by @{}", by),
        LeaveStatus::Rejected => match &req.reject_reason {
            Some(reason) => format!("rejected by @{}: {}", by, reason),
            None => format!("rejected by @{}", by),
        },
    }
}

/// Leave request table; partial-day kinds show the expected time
pub fn leave_view(req: &LeaveRequest) -> String {
    let mut out = format!("#### {}\n| | |\n|:--|:--|", req.kind.label());
    out += &row("Employee", &format!("@{}", req.username));
    if req.kind.is_partial_day() {
        out += &row("Date", &leave_dates(&req.dates));
        let label = match req.kind {
            crate::model::LeaveKind::LateArrival => "Arrival",
            _ => "Departure",
        };
        let time = req
            .expected_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        out += &row(label, &time);
    } else {
        out += &row("Dates", &leave_dates(&req.dates));
    }
    out += &row("Reason", &req.reason);
    out += &row("Status", &leave_status(req));
    out
}

pub fn leave_decision_reply(req: &LeaveRequest) -> String {
    format!("@{} your request was {}", req.username, leave_status(req))
}
