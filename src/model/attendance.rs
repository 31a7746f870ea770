//! Daily attendance record

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Document;
use crate::{Error, Result};

/// Derived status of a day's record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Working,
    OnBreak,
    Completed,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttendanceStatus::Working => "working",
            AttendanceStatus::OnBreak => "on break",
            AttendanceStatus::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakInterval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
}

impl BreakInterval {
    /// Length of the interval, an open interval runs until `now`
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.end.unwrap_or(now);
        (end - self.start).max(Duration::zero())
    }
}

/// One record per (user, calendar day), created at check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    #[serde(default)]
    pub version: u64,
    pub user_id: String,
    pub username: String,
    pub team_id: String,
    pub channel_id: String,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    #[serde(default)]
    pub check_in_image: Option<String>,
    #[serde(default)]
    pub breaks: Vec<BreakInterval>,
    pub check_out: Option<DateTime<Utc>>,
    /// Check-in post, root of the day's thread
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn status(&self) -> AttendanceStatus {
        if self.check_out.is_some() {
            AttendanceStatus::Completed
        } else if self.open_break().is_some() {
            AttendanceStatus::OnBreak
        } else {
            AttendanceStatus::Working
        }
    }

    pub fn open_break(&self) -> Option<&BreakInterval> {
        self.breaks.last().filter(|b| b.end.is_none())
    }

    /// Working → OnBreak
    pub fn start_break(&mut self, at: DateTime<Utc>, reason: &str) -> Result<()> {
        match self.status() {
            AttendanceStatus::Working => {}
            AttendanceStatus::OnBreak => {
                return Err(Error::AlreadyOnBreak {
                    username: self.username.clone(),
                })
            }
            AttendanceStatus::Completed => return Err(self.already_checked_out()),
        }
        self.breaks.push(BreakInterval {
            start: at,
            end: None,
            reason: reason.trim().to_string(),
        });
        Ok(())
    }

    /// OnBreak → Working, closing the most recently opened break
    pub fn end_break(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status() != AttendanceStatus::OnBreak {
            return Err(Error::NotOnBreak {
                username: self.username.clone(),
            });
        }
        if let Some(last) = self.breaks.last_mut() {
            last.end = Some(at);
        }
        Ok(())
    }

    /// Working → Completed
    pub fn check_out(&mut self, at: DateTime<Utc>) -> Result<()> {
        match self.status() {
            AttendanceStatus::Working => {}
            AttendanceStatus::OnBreak => {
                return Err(Error::BreakOpen {
                    username: self.username.clone(),
                })
            }
            AttendanceStatus::Completed => return Err(self.already_checked_out()),
        }
        self.check_out = Some(at);
        Ok(())
    }

    fn already_checked_out(&self) -> Error {
        Error::AlreadyCheckedOut {
            username: self.username.clone(),
            at: self
                .check_out
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }

    /// Total break time; `now` only stands in for the end of an open break
    pub fn break_time(&self, now: DateTime<Utc>) -> Duration {
        self.breaks
            .iter()
            .fold(Duration::zero(), |acc, b| acc + b.duration(now))
    }

    /// Time between check-in and check-out (or `now`) minus breaks
    pub fn worked_time(&self, now: DateTime<Utc>) -> Duration {
        let end = self.check_out.unwrap_or(now);
        let span = (end - self.check_in).max(Duration::zero());
        (span - self.break_time(end)).max(Duration::zero())
    }
}

impl Document for AttendanceRecord {
    const COLLECTION: &'static str = "attendance";

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn unique_key(&self) -> Option<String> {
        Some(day_key(&self.user_id, self.date))
    }
}

/// Uniqueness key of a user's record for a day
pub fn day_key(user_id: &str, date: NaiveDate) -> String {
    format!("{}/{}", user_id, date.format("%Y-%m-%d"))
}
