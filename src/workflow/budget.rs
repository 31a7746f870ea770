//! Budget approval engine
//!
//! Steps and the actor expected at each one:
//!
//! ```text
//! Created ──content──▶ ContentSubmitted ──confirm──▶ Confirmed ──payment──▶ PaymentSubmitted
//!    ▲                        │                                                   │
//!    └────────return──────────┘                                                approve
//!                                                                                 ▼
//!                                              Completed ◀──complete── Approved ◀─┘
//! ```
//!
//! `reject` is legal from every step before `Completed` and freezes the
//! request. The transition table lives in [`BudgetAction::next_step`];
//! everything else in this module is loading, committing and projecting.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::effects::{mention, Effects};
use super::{render, EffectWarning, Outcome};
use crate::channels::ChannelNaming;
use crate::clock::{Clock, SystemClock};
use crate::gateway::{Action, ChannelDirectory, NotificationGateway, View};
use crate::model::{
    optional, parse_amount, required, Approval, BudgetRequest, BudgetStep, Completion,
    Confirmation, PartnerContent, PaymentInfo, Rework, Role, RoleSlots,
};
use crate::store::Repository;
use crate::{Error, Result};

/// Operations that move an existing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAction {
    SubmitContent,
    ConfirmReview,
    ReturnForRework,
    SubmitPayment,
    Approve,
    Complete,
    Reject,
}

impl BudgetAction {
    /// Step the action must find the request at; `None` for reject
    pub fn required_step(self) -> Option<BudgetStep> {
        match self {
            BudgetAction::SubmitContent => Some(BudgetStep::Created),
            BudgetAction::ConfirmReview | BudgetAction::ReturnForRework => {
                Some(BudgetStep::ContentSubmitted)
            }
            BudgetAction::SubmitPayment => Some(BudgetStep::Confirmed),
            BudgetAction::Approve => Some(BudgetStep::PaymentSubmitted),
            BudgetAction::Complete => Some(BudgetStep::Approved),
            BudgetAction::Reject => None,
        }
    }

    /// Transition table. `None` means the pair is not a legal transition.
    pub fn next_step(self, from: BudgetStep) -> Option<BudgetStep> {
        use BudgetStep::*;
        match (self, from) {
            (BudgetAction::SubmitContent, Created) => Some(ContentSubmitted),
            (BudgetAction::ConfirmReview, ContentSubmitted) => Some(Confirmed),
            (BudgetAction::ReturnForRework, ContentSubmitted) => Some(Created),
            (BudgetAction::SubmitPayment, Confirmed) => Some(PaymentSubmitted),
            (BudgetAction::Approve, PaymentSubmitted) => Some(Approved),
            (BudgetAction::Complete, Approved) => Some(Completed),
            (BudgetAction::Reject, step) if step < Completed => Some(step),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BudgetAction::SubmitContent => "submit content",
            BudgetAction::ConfirmReview => "confirm review",
            BudgetAction::ReturnForRework => "return for rework",
            BudgetAction::SubmitPayment => "submit payment",
            BudgetAction::Approve => "approve",
            BudgetAction::Complete => "complete",
            BudgetAction::Reject => "reject",
        }
    }
}

impl fmt::Display for BudgetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check a request against an action, returning the step it moves to
pub fn guard(action: BudgetAction, req: &BudgetRequest) -> Result<BudgetStep> {
    if req.is_rejected() {
        return Err(Error::AlreadyRejected { id: req.id.clone() });
    }
    action
        .next_step(req.current_step)
        .ok_or_else(|| match action.required_step() {
            Some(expected) => Error::WrongStep {
                current: req.current_step,
                expected,
            },
            None => Error::AlreadyCompleted { id: req.id.clone() },
        })
}

/// Step 1 input, as typed by the requester
#[derive(Debug, Clone, Default)]
pub struct NewBudgetRequest {
    pub origin_channel: String,
    pub name: String,
    pub partner: String,
    pub amount: String,
    pub purpose: String,
    /// `YYYY-MM-DD`
    pub deadline: String,
}

/// Step 4 input
#[derive(Debug, Clone, Default)]
pub struct PaymentInput {
    pub recipient: String,
    pub account: String,
    pub bank: String,
    pub amount: String,
}

/// Message change planned for a transition
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    /// Edit the role's message, or post one when it has none yet
    Upsert { role: Role, view: View },
    /// Threaded reply under the role's message, mentioning a user
    Reply {
        role: Role,
        notify: Option<String>,
        text: String,
    },
    /// Edit every message the request has posted
    EditAll { view: View },
}

/// Guarded six-step budget workflow
pub struct BudgetEngine {
    store: Arc<dyn Repository<BudgetRequest>>,
    directory: Arc<dyn ChannelDirectory>,
    gateway: Arc<dyn NotificationGateway>,
    naming: ChannelNaming,
    callback_url: String,
    clock: Arc<dyn Clock>,
}

impl BudgetEngine {
    pub fn new(
        store: Arc<dyn Repository<BudgetRequest>>,
        directory: Arc<dyn ChannelDirectory>,
        gateway: Arc<dyn NotificationGateway>,
        naming: ChannelNaming,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            naming,
            callback_url: callback_url.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Step 1: resolve every sibling channel, persist, then post into the
    /// origin and partner channels.
    pub async fn create_request(
        &self,
        actor: &str,
        input: NewBudgetRequest,
    ) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        let name = required("name", &input.name)?;
        let partner = required("partner", &input.partner)?;
        let purpose = required("purpose", &input.purpose)?;
        let amount = parse_amount("amount", &input.amount)?;
        let deadline = parse_date("deadline", &input.deadline)?;

        let origin = self
            .directory
            .channel(input.origin_channel.trim())
            .await
            .map_err(|e| Error::ChannelResolution(format!("{}: {}", input.origin_channel, e)))?;
        let channels = self
            .naming
            .resolve_all(self.directory.as_ref(), &origin, &partner)
            .await?;

        let now = self.clock.now();
        let mut req = BudgetRequest {
            id: Uuid::new_v4().to_string(),
            version: 0,
            team_id: origin.team_id,
            current_step: BudgetStep::Created,
            channels,
            posts: RoleSlots::default(),
            requested_by: actor,
            name,
            partner,
            amount,
            purpose,
            deadline,
            content: None,
            confirmation: None,
            rework: None,
            payment: None,
            approval: None,
            completion: None,
            rejected_at: None,
            rejected_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create(&req).await?;
        info!(
            "Created budget request {} ({}, partner {})",
            req.id, req.name, req.partner
        );

        let status = render::step_status(&req);
        let effects = vec![
            Effect::Upsert {
                role: Role::Origin,
                view: View::text(status.clone()),
            },
            Effect::Upsert {
                role: Role::Partner,
                view: View::with_actions(status, vec![self.fill_content(&req.id)]),
            },
        ];
        let warnings = self.project(&mut req, effects).await;
        Ok(Outcome::new(req, warnings))
    }

    /// Step 2: partner submits post content
    pub async fn submit_content(
        &self,
        id: &str,
        actor: &str,
        text: &str,
        post_link: &str,
        page_link: &str,
    ) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        let text = required("post content", text)?;
        let post_link = optional(post_link);
        let page_link = optional(page_link);

        self.transition(id, BudgetAction::SubmitContent, move |req, now| {
            req.content = Some(PartnerContent {
                submitted_by: actor,
                text,
                post_link,
                page_link,
                submitted_at: now,
            });
        })
        .await
    }

    /// Step 3: reviewer confirms the content
    pub async fn confirm_review(&self, id: &str, actor: &str) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        self.transition(id, BudgetAction::ConfirmReview, move |req, now| {
            req.confirmation = Some(Confirmation {
                confirmed_by: actor,
                confirmed_at: now,
            });
        })
        .await
    }

    /// Reviewer sends the content back; the request returns to step 1
    pub async fn return_for_rework(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        let reason = required("reason", reason)?;
        self.transition(id, BudgetAction::ReturnForRework, move |req, now| {
            req.content = None;
            req.rework = Some(Rework {
                returned_by: actor,
                reason,
                returned_at: now,
            });
        })
        .await
    }

    /// Step 4: partner submits payment details
    pub async fn submit_payment(
        &self,
        id: &str,
        actor: &str,
        input: PaymentInput,
    ) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        let recipient = required("recipient", &input.recipient)?;
        let account = required("account", &input.account)?;
        let bank = required("bank", &input.bank)?;
        let amount = parse_amount("payment amount", &input.amount)?;

        self.transition(id, BudgetAction::SubmitPayment, move |req, now| {
            req.payment = Some(PaymentInfo {
                submitted_by: actor,
                recipient,
                account,
                bank,
                amount,
                submitted_at: now,
            });
        })
        .await
    }

    /// Step 5: approver approves the payment
    pub async fn approve(&self, id: &str, actor: &str) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        self.transition(id, BudgetAction::Approve, move |req, now| {
            req.approval = Some(Approval {
                approved_by: actor,
                approved_at: now,
            });
        })
        .await
    }

    /// Step 6: finance records the transfer
    pub async fn complete(
        &self,
        id: &str,
        actor: &str,
        transaction_ref: &str,
        bill_ref: &str,
    ) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        let transaction_ref = required("transaction reference", transaction_ref)?;
        let bill_ref = optional(bill_ref);

        self.transition(id, BudgetAction::Complete, move |req, now| {
            req.completion = Some(Completion {
                completed_by: actor,
                transaction_ref,
                bill_ref,
                completed_at: now,
            });
        })
        .await
    }

    /// Reject at any step before completion
    pub async fn reject(&self, id: &str, actor: &str) -> Result<Outcome<BudgetRequest>> {
        let actor = required("actor", actor)?;
        self.transition(id, BudgetAction::Reject, move |req, now| {
            req.rejected_at = Some(now);
            req.rejected_by = Some(actor);
        })
        .await
    }

    /// Fetch a request by id
    pub async fn get(&self, id: &str) -> Result<BudgetRequest> {
        let id = id.trim();
        let not_found = || Error::NotFound {
            kind: "budget request",
            id: id.to_string(),
        };
        if Uuid::parse_str(id).is_err() {
            return Err(not_found());
        }
        self.store.get(id).await?.ok_or_else(not_found)
    }

    /// Load, guard, apply, commit, project
    async fn transition<F>(
        &self,
        id: &str,
        action: BudgetAction,
        apply: F,
    ) -> Result<Outcome<BudgetRequest>>
    where
        F: FnOnce(&mut BudgetRequest, DateTime<Utc>) + Send,
    {
        let mut req = self.get(id).await?;
        let next = guard(action, &req)?;
        let before = req.clone();

        let now = self.clock.now();
        apply(&mut req, now);
        req.current_step = next;
        req.updated_at = now;
        req.check_payloads()
            .map_err(|e| Error::Store(format!("budget request {}: {}", req.id, e)))?;
        self.store.replace(&mut req).await?;
        info!(
            "Budget request {}: {} (step {} → {})",
            req.id,
            action,
            before.current_step.number(),
            req.current_step.number()
        );

        let effects = self.plan(action, &before, &req);
        let warnings = self.project(&mut req, effects).await;
        Ok(Outcome::new(req, warnings))
    }

    /// Message changes for a committed transition. Pure: depends only on
    /// the action and the two snapshots.
    pub(crate) fn plan(
        &self,
        action: BudgetAction,
        before: &BudgetRequest,
        after: &BudgetRequest,
    ) -> Vec<Effect> {
        let status = render::step_status(after);
        let id = after.id.as_str();

        match action {
            BudgetAction::SubmitContent => {
                let detail = after
                    .content
                    .as_ref()
                    .map(render::content_rows)
                    .unwrap_or_default();
                let full = format!("{}{}", status, detail);
                let mut effects = vec![
                    Effect::Upsert {
                        role: Role::Partner,
                        view: View::settled(full.clone()),
                    },
                    Effect::Upsert {
                        role: Role::Review,
                        view: View::with_actions(
                            full,
                            vec![
                                self.button("Confirm", "/api/budget/tlqc-confirm", id),
                                self.button("Return", "/api/budget/tlqc-return-form", id),
                            ],
                        ),
                    },
                ];
                if before.post(Role::Review).is_some() {
                    effects.push(Effect::Reply {
                        role: Role::Review,
                        notify: before.rework.as_ref().map(|r| r.returned_by.clone()),
                        text: "content was resubmitted, please review it again".to_string(),
                    });
                }
                effects.push(Effect::Upsert {
                    role: Role::Origin,
                    view: View::text(status),
                });
                effects
            }
            BudgetAction::ConfirmReview => vec![
                Effect::Upsert {
                    role: Role::Review,
                    view: View::settled(status.clone()),
                },
                Effect::Upsert {
                    role: Role::Partner,
                    view: View::with_actions(
                        status.clone(),
                        vec![self.button("Fill payment info", "/api/budget/partner-payment-form", id)],
                    ),
                },
                Effect::Reply {
                    role: Role::Partner,
                    notify: after.content.as_ref().map(|c| c.submitted_by.clone()),
                    text: "content confirmed, please fill in the payment info".to_string(),
                },
                Effect::Upsert {
                    role: Role::Origin,
                    view: View::text(status),
                },
            ],
            BudgetAction::ReturnForRework => {
                let returned = render::budget_returned(after);
                let reason = after
                    .rework
                    .as_ref()
                    .map(|r| r.reason.clone())
                    .unwrap_or_default();
                vec![
                    Effect::Upsert {
                        role: Role::Review,
                        view: View::settled(returned.clone()),
                    },
                    Effect::Upsert {
                        role: Role::Partner,
                        view: View::with_actions(returned.clone(), vec![self.fill_content(id)]),
                    },
                    Effect::Reply {
                        role: Role::Partner,
                        notify: before.content.as_ref().map(|c| c.submitted_by.clone()),
                        text: format!("content was returned for rework: {}", reason),
                    },
                    Effect::Upsert {
                        role: Role::Origin,
                        view: View::text(returned),
                    },
                ]
            }
            BudgetAction::SubmitPayment => {
                let detail = after
                    .payment
                    .as_ref()
                    .map(render::payment_rows)
                    .unwrap_or_default();
                let full = format!("{}{}", status, detail);
                vec![
                    Effect::Upsert {
                        role: Role::Partner,
                        view: View::settled(full.clone()),
                    },
                    Effect::Upsert {
                        role: Role::Approval,
                        view: View::with_actions(
                            full,
                            vec![
                                self.button("Approve", "/api/budget/approval-approve", id),
                                self.button("Reject", "/api/budget/reject", id),
                            ],
                        ),
                    },
                    Effect::Upsert {
                        role: Role::Origin,
                        view: View::text(status),
                    },
                ]
            }
            BudgetAction::Approve => vec![
                Effect::Upsert {
                    role: Role::Approval,
                    view: View::settled(status.clone()),
                },
                Effect::Upsert {
                    role: Role::Finance,
                    view: View::with_actions(
                        status.clone(),
                        vec![self.button("Complete", "/api/budget/finance-complete-form", id)],
                    ),
                },
                Effect::Upsert {
                    role: Role::Origin,
                    view: View::text(status),
                },
            ],
            BudgetAction::Complete => vec![Effect::EditAll {
                view: View::settled(render::budget_completed(after)),
            }],
            BudgetAction::Reject => vec![Effect::EditAll {
                view: View::settled(render::budget_rejected(after)),
            }],
        }
    }

    /// Apply planned effects in order, best effort. A role without a message
    /// gets a fresh post, and new handles are saved with a second replace.
    async fn project(&self, req: &mut BudgetRequest, effects: Vec<Effect>) -> Vec<EffectWarning> {
        let mut fx = Effects::new(self.gateway.as_ref());
        let gateway = fx.gateway();
        let handles_before = req.posts.clone();

        for effect in effects {
            match effect {
                Effect::Upsert { role, view } => {
                    let handle = match req.post(role) {
                        Some(post) => {
                            fx.attempt(
                                format!("edit {} message", role),
                                gateway.upsert_view(Some(post), req.channel(role), &view),
                            )
                            .await
                        }
                        None => {
                            debug!("Posting {} message for {}", role, req.id);
                            let first = View {
                                text: render::announce(&view.text),
                                actions: view.actions.clone(),
                            };
                            fx.attempt(
                                format!("post {} message", role),
                                gateway.upsert_view(None, req.channel(role), &first),
                            )
                            .await
                        }
                    };
                    if let Some(handle) = handle {
                        req.remember_post(role, handle);
                    }
                }
                Effect::Reply { role, notify, text } => match req.post(role) {
                    Some(root) => {
                        let who = mention(gateway, notify.as_deref()).await;
                        let message = format!("{} {}", who, text);
                        fx.attempt(
                            format!("reply in {} thread", role),
                            gateway.post_message(req.channel(role), &message, Some(root), None),
                        )
                        .await;
                    }
                    None => fx.record(
                        format!("reply in {} thread", role),
                        format!("no {} message", role),
                    ),
                },
                Effect::EditAll { view } => {
                    let posted = req.posted();
                    let results = join_all(posted.iter().map(|(_, channel, post)| {
                        gateway.edit_message(post, channel, &view.text, view.actions.as_deref())
                    }))
                    .await;
                    for ((role, _, _), result) in posted.iter().zip(results) {
                        if let Err(e) = result {
                            fx.record(format!("edit {} message", role), e.to_string());
                        }
                    }
                }
            }
        }

        if req.posts != handles_before {
            if let Err(e) = self.store.replace(req).await {
                fx.record("save message handles", e.to_string());
            }
        }
        fx.into_warnings()
    }

    fn button(&self, name: &str, path: &str, id: &str) -> Action {
        Action::button(name, &self.callback_url, path, id)
    }

    fn fill_content(&self, id: &str) -> Action {
        self.button("Fill post content", "/api/budget/partner-content-form", id)
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value))
    })
}
