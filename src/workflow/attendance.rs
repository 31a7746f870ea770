//! Daily attendance service
//!
//! One record per user per working day. The day is the calendar date in the
//! configured UTC offset, so a 00:30 check-in at +07:00 belongs to that local
//! day and not the previous UTC one.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::effects::Effects;
use super::{render, Outcome};
use crate::clock::{Clock, SystemClock};
use crate::gateway::{ChannelDirectory, NotificationGateway};
use crate::model::attendance::day_key;
use crate::model::{optional, required, AttendanceRecord, AttendanceStatus, LeaveRequest};
use crate::store::Repository;
use crate::{Error, Result};

/// One record as shown in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub user_id: String,
    pub username: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in: DateTime<FixedOffset>,
    pub check_out: Option<DateTime<FixedOffset>>,
    /// Worked time, live for records still open
    #[serde(skip)]
    pub worked: Duration,
    /// Break time, open breaks counted up to now
    #[serde(skip)]
    pub breaks: Duration,
}

impl ReportLine {
    fn from_record(record: &AttendanceRecord, now: DateTime<chrono::Utc>, offset: FixedOffset) -> Self {
        Self {
            user_id: record.user_id.clone(),
            username: record.username.clone(),
            date: record.date,
            status: record.status(),
            check_in: record.check_in.with_timezone(&offset),
            check_out: record.check_out.map(|t| t.with_timezone(&offset)),
            worked: record.worked_time(now),
            breaks: record.break_time(now),
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  @{:<16} {:<10} in {}  out {}  worked {}  breaks {}",
            self.date.format("%Y-%m-%d"),
            self.username,
            self.status.to_string(),
            self.check_in.format("%H:%M"),
            self.check_out
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string()),
            render::duration(self.worked),
            render::duration(self.breaks),
        )
    }
}

/// Everyone's attendance for a day plus the leave covering it
#[derive(Debug, Clone)]
pub struct DayReport {
    pub date: NaiveDate,
    pub lines: Vec<ReportLine>,
    pub leaves: Vec<LeaveRequest>,
}

impl fmt::Display for DayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Attendance for {}", self.date.format("%Y-%m-%d"))?;
        if self.lines.is_empty() {
            writeln!(f, "  (no check-ins)")?;
        }
        for line in &self.lines {
            writeln!(f, "  {}", line)?;
        }
        if !self.leaves.is_empty() {
            writeln!(f, "Leave")?;
            for leave in &self.leaves {
                writeln!(f, "  @{} {} ({})", leave.username, leave.kind.label(), leave.status)?;
            }
        }
        Ok(())
    }
}

/// Check-in / break / check-out state machine
pub struct AttendanceService {
    records: Arc<dyn Repository<AttendanceRecord>>,
    leaves: Arc<dyn Repository<LeaveRequest>>,
    directory: Arc<dyn ChannelDirectory>,
    gateway: Arc<dyn NotificationGateway>,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        records: Arc<dyn Repository<AttendanceRecord>>,
        leaves: Arc<dyn Repository<LeaveRequest>>,
        directory: Arc<dyn ChannelDirectory>,
        gateway: Arc<dyn NotificationGateway>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            records,
            leaves,
            directory,
            gateway,
            offset,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the day. Posts the check-in message that later replies thread under.
    pub async fn check_in(
        &self,
        user_id: &str,
        username: &str,
        channel_id: &str,
        image_file_id: Option<&str>,
    ) -> Result<Outcome<AttendanceRecord>> {
        let user_id = required("user id", user_id)?;
        let username = required("username", username)?;
        let now = self.clock.now();
        let date = self.clock.today(self.offset);

        if let Some(existing) = self.records.find_by_key(&day_key(&user_id, date)).await? {
            return Err(Error::AlreadyCheckedIn {
                username,
                at: render::clock_time(existing.check_in, self.offset),
            });
        }

        let channel = self.directory.channel(channel_id.trim()).await?;
        let mut record = AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            version: 0,
            user_id,
            username,
            team_id: channel.team_id,
            channel_id: channel.id,
            date,
            check_in: now,
            check_in_image: image_file_id.and_then(optional),
            breaks: Vec::new(),
            check_out: None,
            post_id: None,
            created_at: now,
            updated_at: now,
        };

        match self.records.create(&record).await {
            Ok(()) => {}
            Err(Error::Conflict { .. }) => {
                return Err(Error::AlreadyCheckedIn {
                    username: record.username,
                    at: render::clock_time(now, self.offset),
                })
            }
            Err(e) => return Err(e),
        }
        info!("{} checked in for {}", record.username, date);

        let mut fx = Effects::new(self.gateway.as_ref());
        let text = render::check_in_post(&record, self.offset);
        let posted = fx
            .attempt(
                "post check-in message",
                self.gateway
                    .post_message(&record.channel_id, &text, None, None),
            )
            .await;
        if let Some(post_id) = posted {
            record.post_id = Some(post_id);
            if let Err(e) = self.records.replace(&mut record).await {
                fx.record("save check-in message", e.to_string());
            }
        }
        Ok(Outcome::new(record, fx.into_warnings()))
    }

    pub async fn break_start(
        &self,
        user_id: &str,
        username: &str,
        reason: &str,
    ) -> Result<Outcome<AttendanceRecord>> {
        let reason = reason.trim().to_string();
        self.update_today(user_id, username, |record, now, offset| {
            record.start_break(now, &reason)?;
            Ok(render::break_start_reply(&record.username, now, &reason, offset))
        })
        .await
    }

    pub async fn break_end(&self, user_id: &str, username: &str) -> Result<Outcome<AttendanceRecord>> {
        self.update_today(user_id, username, |record, now, offset| {
            record.end_break(now)?;
            let length = record
                .breaks
                .last()
                .map(|b| b.duration(now))
                .unwrap_or_else(Duration::zero);
            Ok(render::break_end_reply(&record.username, now, length, offset))
        })
        .await
    }

    pub async fn check_out(&self, user_id: &str, username: &str) -> Result<Outcome<AttendanceRecord>> {
        self.update_today(user_id, username, |record, now, offset| {
            record.check_out(now)?;
            Ok(render::check_out_reply(record, offset))
        })
        .await
    }

    /// Load today's record, apply a transition, commit, then reply in the
    /// check-in thread
    async fn update_today<F>(
        &self,
        user_id: &str,
        username: &str,
        apply: F,
    ) -> Result<Outcome<AttendanceRecord>>
    where
        F: FnOnce(&mut AttendanceRecord, DateTime<chrono::Utc>, FixedOffset) -> Result<String> + Send,
    {
        let user_id = required("user id", user_id)?;
        let username = required("username", username)?;
        let now = self.clock.now();
        let date = self.clock.today(self.offset);

        let mut record = self
            .records
            .find_by_key(&day_key(&user_id, date))
            .await?
            .ok_or(Error::NotCheckedIn { username })?;

        let reply = apply(&mut record, now, self.offset).map_err(|e| match e {
            // model reports UTC, users read local time
            Error::AlreadyCheckedOut { username, .. } => Error::AlreadyCheckedOut {
                username,
                at: record
                    .check_out
                    .map(|t| render::clock_time(t, self.offset))
                    .unwrap_or_default(),
            },
            other => other,
        })?;
        record.updated_at = now;
        self.records.replace(&mut record).await?;
        info!("{} is now {}", record.username, record.status());

        let mut fx = Effects::new(self.gateway.as_ref());
        if let Some(root) = record.post_id.as_deref() {
            fx.attempt(
                "reply in check-in thread",
                self.gateway
                    .post_message(&record.channel_id, &reply, Some(root), None),
            )
            .await;
        }
        Ok(Outcome::new(record, fx.into_warnings()))
    }

    /// Today's record for a user, if checked in
    pub async fn today(&self, user_id: &str) -> Result<Option<AttendanceRecord>> {
        let date = self.clock.today(self.offset);
        self.records.find_by_key(&day_key(user_id.trim(), date)).await
    }

    /// Every record of a day with live totals, plus leave covering the day
    pub async fn day_report(&self, date: NaiveDate) -> Result<DayReport> {
        let now = self.clock.now();
        let mut lines: Vec<ReportLine> = self
            .records
            .list()
            .await?
            .iter()
            .filter(|r| r.date == date)
            .map(|r| ReportLine::from_record(r, now, self.offset))
            .collect();
        lines.sort_by(|a, b| a.check_in.cmp(&b.check_in));

        let leaves = self
            .leaves
            .list()
            .await?
            .into_iter()
            .filter(|l| l.covers(date))
            .collect();

        Ok(DayReport {
            date,
            lines,
            leaves,
        })
    }

    /// One user's records between two dates, inclusive
    pub async fn user_report(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReportLine>> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "report range starts after it ends ({} > {})",
                from, to
            )));
        }
        let now = self.clock.now();
        let user_id = user_id.trim();
        let mut lines: Vec<ReportLine> = self
            .records
            .list()
            .await?
            .iter()
            .filter(|r| r.user_id == user_id && r.date >= from && r.date <= to)
            .map(|r| ReportLine::from_record(r, now, self.offset))
            .collect();
        lines.sort_by_key(|l| l.date);
        Ok(lines)
    }
}
