//! Budget request document and step enumeration

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Document;

/// Ordered steps of the budget workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStep {
    /// Sale created the request, waiting for partner content
    Created,
    /// Partner submitted content, waiting for review
    ContentSubmitted,
    /// Reviewer confirmed the content, waiting for payment info
    Confirmed,
    /// Partner submitted payment info, waiting for approval
    PaymentSubmitted,
    /// Approver approved, waiting for finance
    Approved,
    /// Finance completed the payment
    Completed,
}

impl BudgetStep {
    pub const ALL: [BudgetStep; 6] = [
        BudgetStep::Created,
        BudgetStep::ContentSubmitted,
        BudgetStep::Confirmed,
        BudgetStep::PaymentSubmitted,
        BudgetStep::Approved,
        BudgetStep::Completed,
    ];

    /// 1-based step number shown to users
    pub fn number(self) -> u8 {
        match self {
            BudgetStep::Created => 1,
            BudgetStep::ContentSubmitted => 2,
            BudgetStep::Confirmed => 3,
            BudgetStep::PaymentSubmitted => 4,
            BudgetStep::Approved => 5,
            BudgetStep::Completed => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BudgetStep::Created => "waiting for partner content",
            BudgetStep::ContentSubmitted => "waiting for content review",
            BudgetStep::Confirmed => "waiting for payment info",
            BudgetStep::PaymentSubmitted => "waiting for approval",
            BudgetStep::Approved => "waiting for finance",
            BudgetStep::Completed => "completed",
        }
    }
}

impl fmt::Display for BudgetStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.label())
    }
}

/// Channel roles a budget request posts into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sale channel the request was created from
    Origin,
    /// Per-partner channel
    Partner,
    /// Content review channel
    Review,
    /// Approval channel
    Approval,
    /// Finance channel
    Finance,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Origin,
        Role::Partner,
        Role::Review,
        Role::Approval,
        Role::Finance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Origin => "origin",
            Role::Partner => "partner",
            Role::Review => "review",
            Role::Approval => "approval",
            Role::Finance => "finance",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per channel role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSlots<T> {
    pub origin: T,
    pub partner: T,
    pub review: T,
    pub approval: T,
    pub finance: T,
}

impl<T> RoleSlots<T> {
    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Origin => &self.origin,
            Role::Partner => &self.partner,
            Role::Review => &self.review,
            Role::Approval => &self.approval,
            Role::Finance => &self.finance,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Origin => &mut self.origin,
            Role::Partner => &mut self.partner,
            Role::Review => &mut self.review,
            Role::Approval => &mut self.approval,
            Role::Finance => &mut self.finance,
        }
    }
}

/// Step 2 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerContent {
    pub submitted_by: String,
    pub text: String,
    pub post_link: Option<String>,
    pub page_link: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Step 3 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed_by: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Last return-for-rework decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rework {
    pub returned_by: String,
    pub reason: String,
    pub returned_at: DateTime<Utc>,
}

/// Step 4 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub submitted_by: String,
    pub recipient: String,
    pub account: String,
    pub bank: String,
    pub amount: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Step 5 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Step 6 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub completed_by: String,
    pub transaction_ref: String,
    pub bill_ref: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Exactly one of these holds for any request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    InProgress,
    Rejected,
    Completed,
}

/// A budget request moving through the six-step workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRequest {
    /// Generated identifier, immutable after creation
    pub id: String,
    /// Optimistic concurrency counter, bumped on every replace
    #[serde(default)]
    pub version: u64,
    pub team_id: String,
    pub current_step: BudgetStep,

    /// Resolved once at creation, never re-resolved
    pub channels: RoleSlots<String>,
    /// Message handle per channel, empty until first posted
    #[serde(default)]
    pub posts: RoleSlots<Option<String>>,

    // Step 1: sale info
    pub requested_by: String,
    pub name: String,
    pub partner: String,
    pub amount: u64,
    pub purpose: String,
    pub deadline: NaiveDate,

    pub content: Option<PartnerContent>,
    pub confirmation: Option<Confirmation>,
    pub rework: Option<Rework>,
    pub payment: Option<PaymentInfo>,
    pub approval: Option<Approval>,
    pub completion: Option<Completion>,

    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetRequest {
    pub fn state(&self) -> RequestState {
        if self.rejected_at.is_some() {
            RequestState::Rejected
        } else if self.current_step == BudgetStep::Completed {
            RequestState::Completed
        } else {
            RequestState::InProgress
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_at.is_some()
    }

    pub fn channel(&self, role: Role) -> &str {
        self.channels.get(role)
    }

    pub fn post(&self, role: Role) -> Option<&str> {
        self.posts.get(role).as_deref()
    }

    /// Store a message handle. An existing handle is never replaced.
    pub fn remember_post(&mut self, role: Role, post_id: String) {
        let slot = self.posts.get_mut(role);
        if slot.is_none() {
            *slot = Some(post_id);
        }
    }

    /// Every (role, channel, message) this request has posted so far
    pub fn posted(&self) -> Vec<(Role, &str, &str)> {
        Role::ALL
            .iter()
            .filter_map(|&role| self.post(role).map(|post| (role, self.channel(role), post)))
            .collect()
    }

    /// Verify that no step payload is present before its step is reached.
    pub fn check_payloads(&self) -> std::result::Result<(), String> {
        let step = self.current_step;
        let checks = [
            ("content", self.content.is_some(), BudgetStep::ContentSubmitted),
            ("confirmation", self.confirmation.is_some(), BudgetStep::Confirmed),
            ("payment", self.payment.is_some(), BudgetStep::PaymentSubmitted),
            ("approval", self.approval.is_some(), BudgetStep::Approved),
            ("completion", self.completion.is_some(), BudgetStep::Completed),
        ];
        for (field, present, reached_at) in checks {
            if present != (step >= reached_at) {
                return Err(format!(
                    "{} is {} at step {}",
                    field,
                    if present { "present" } else { "missing" },
                    step
                ));
            }
        }
        Ok(())
    }
}

impl Document for BudgetRequest {
    const COLLECTION: &'static str = "budget_requests";

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
