//! Leave approval service

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::effects::Effects;
use super::{render, Outcome};
use crate::channels::split_suffix;
use crate::clock::{Clock, SystemClock};
use crate::config::{AttendanceConfig, LeaveNotify};
use crate::gateway::{Action, ChannelDirectory, NotificationGateway, View};
use crate::model::{optional, required, LeaveKind, LeaveRequest, LeaveStatus};
use crate::store::Repository;
use crate::{Error, Result};

/// Leave request as typed by the requester
#[derive(Debug, Clone)]
pub struct LeaveInput {
    pub kind: LeaveKind,
    /// `YYYY-MM-DD` dates
    pub dates: Vec<String>,
    /// `HH:MM`, required for late arrival and early departure
    pub expected_time: Option<String>,
    pub reason: String,
}

/// Parse a date list: at least one date, each valid, none before `today`
pub fn validate_dates(dates: &[String], today: NaiveDate) -> Result<Vec<NaiveDate>> {
    if dates.iter().all(|d| d.trim().is_empty()) {
        return Err(Error::InvalidInput("at least one date is required".to_string()));
    }

    let mut parsed = Vec::with_capacity(dates.len());
    for raw in dates.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| Error::InvalidInput(format!("invalid date '{}', use YYYY-MM-DD", raw)))?;
        if date < today {
            return Err(Error::InvalidInput(format!("date {} is in the past", raw)));
        }
        if !parsed.contains(&date) {
            parsed.push(date);
        }
    }
    parsed.sort();
    Ok(parsed)
}

/// Pending → Approved | Rejected, never by the requester
pub struct LeaveService {
    store: Arc<dyn Repository<LeaveRequest>>,
    directory: Arc<dyn ChannelDirectory>,
    gateway: Arc<dyn NotificationGateway>,
    settings: AttendanceConfig,
    offset: FixedOffset,
    callback_url: String,
    clock: Arc<dyn Clock>,
}

impl LeaveService {
    pub fn new(
        store: Arc<dyn Repository<LeaveRequest>>,
        directory: Arc<dyn ChannelDirectory>,
        gateway: Arc<dyn NotificationGateway>,
        settings: AttendanceConfig,
        offset: FixedOffset,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            settings,
            offset,
            callback_url: callback_url.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// File a request from the attendance channel and post it for approval
    pub async fn request(
        &self,
        user_id: &str,
        username: Option<&str>,
        channel_id: &str,
        input: LeaveInput,
    ) -> Result<Outcome<LeaveRequest>> {
        let user_id = required("user id", user_id)?;
        let reason = required("reason", &input.reason)?;
        let dates = validate_dates(&input.dates, self.clock.today(self.offset))?;

        let expected_time = if input.kind.is_partial_day() {
            if dates.len() != 1 {
                return Err(Error::InvalidInput(format!(
                    "{} covers exactly one date",
                    input.kind.label()
                )));
            }
            let raw = input.expected_time.as_deref().and_then(optional).ok_or_else(|| {
                Error::InvalidInput(format!("{} needs an expected time", input.kind.label()))
            })?;
            Some(NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|_| {
                Error::InvalidInput(format!("invalid time '{}', use HH:MM", raw))
            })?)
        } else {
            None
        };

        let username = match username.and_then(optional) {
            Some(name) => name,
            None => self.gateway.display_name(&user_id).await?,
        };

        let channel = self.directory.channel(channel_id.trim()).await?;
        let suffix = split_suffix(&self.settings.channel, &channel.name)?;
        let approval_name = format!("{}{}", self.settings.approval_channel, suffix);
        let approval_channel_id = self
            .directory
            .resolve_channel(&channel.team_id, &approval_name)
            .await
            .map_err(|e| Error::ChannelResolution(format!("{}: {}", approval_name, e)))?;

        let now = self.clock.now();
        let mut req = LeaveRequest {
            id: Uuid::new_v4().to_string(),
            version: 0,
            user_id,
            username,
            team_id: channel.team_id,
            channel_id: channel.id,
            approval_channel_id,
            post_id: None,
            approval_post_id: None,
            kind: input.kind,
            dates,
            expected_time,
            reason,
            status: LeaveStatus::Pending,
            decided_by: None,
            decided_by_name: None,
            decided_at: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create(&req).await?;
        info!("Leave request {} filed by {}", req.id, req.username);

        let mut fx = Effects::new(self.gateway.as_ref());
        let view = render::leave_view(&req);
        let buttons = vec![
            Action::button("Approve", &self.callback_url, "/api/attendance/approve", &req.id),
            Action::button("Reject", &self.callback_url, "/api/attendance/reject", &req.id),
        ];
        req.post_id = fx
            .attempt(
                "post leave request",
                self.gateway.post_message(&req.channel_id, &view, None, None),
            )
            .await;
        req.approval_post_id = fx
            .attempt(
                "post leave approval",
                self.gateway.post_message(
                    &req.approval_channel_id,
                    &render::announce(&view),
                    None,
                    Some(&buttons),
                ),
            )
            .await;

        if req.post_id.is_some() || req.approval_post_id.is_some() {
            if let Err(e) = self.store.replace(&mut req).await {
                fx.record("save leave messages", e.to_string());
            }
        }
        Ok(Outcome::new(req, fx.into_warnings()))
    }

    pub async fn approve(
        &self,
        id: &str,
        actor_id: &str,
        actor_name: &str,
    ) -> Result<Outcome<LeaveRequest>> {
        self.decide(id, LeaveStatus::Approved, actor_id, actor_name, None)
            .await
    }

    pub async fn reject(
        &self,
        id: &str,
        actor_id: &str,
        actor_name: &str,
        reason: &str,
    ) -> Result<Outcome<LeaveRequest>> {
        self.decide(id, LeaveStatus::Rejected, actor_id, actor_name, optional(reason))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<LeaveRequest> {
        let id = id.trim();
        let not_found = || Error::NotFound {
            kind: "leave request",
            id: id.to_string(),
        };
        if Uuid::parse_str(id).is_err() {
            return Err(not_found());
        }
        self.store.get(id).await?.ok_or_else(not_found)
    }

    async fn decide(
        &self,
        id: &str,
        status: LeaveStatus,
        actor_id: &str,
        actor_name: &str,
        reason: Option<String>,
    ) -> Result<Outcome<LeaveRequest>> {
        let actor_id = required("actor", actor_id)?;
        let mut req = self.get(id).await?;

        let actor_name = match optional(actor_name) {
            Some(name) => name,
            None => self
                .gateway
                .display_name(&actor_id)
                .await
                .unwrap_or_else(|_| actor_id.clone()),
        };

        let now = self.clock.now();
        req.decide(status, &actor_id, &actor_name, reason, now)?;
        req.updated_at = now;
        self.store.replace(&mut req).await?;
        info!("Leave request {} {} by {}", req.id, req.status, actor_name);

        let mut fx = Effects::new(self.gateway.as_ref());
        let view = View::settled(render::leave_view(&req));
        if let Some(post) = req.post_id.as_deref() {
            fx.attempt(
                "edit leave request",
                self.gateway
                    .edit_message(post, &req.channel_id, &view.text, None),
            )
            .await;
        }
        if let Some(post) = req.approval_post_id.as_deref() {
            fx.attempt(
                "edit leave approval",
                self.gateway.edit_message(
                    post,
                    &req.approval_channel_id,
                    &view.text,
                    view.actions.as_deref(),
                ),
            )
            .await;
        }

        let reply = render::leave_decision_reply(&req);
        match (self.settings.leave_notify, req.post_id.as_deref()) {
            (LeaveNotify::Thread, Some(root)) => {
                fx.attempt(
                    "reply in leave thread",
                    self.gateway
                        .post_message(&req.channel_id, &reply, Some(root), None),
                )
                .await;
            }
            _ => {
                fx.attempt(
                    "direct message requester",
                    self.gateway.direct_message(&req.user_id, &reply),
                )
                .await;
            }
        }

        Ok(Outcome::new(req, fx.into_warnings()))
    }
}
