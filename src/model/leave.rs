//! Leave request document

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::Document;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Annual,
    Emergency,
    Sick,
    LateArrival,
    EarlyDeparture,
}

impl LeaveKind {
    /// Late arrival and early departure cover part of a single day
    pub fn is_partial_day(self) -> bool {
        matches!(self, LeaveKind::LateArrival | LeaveKind::EarlyDeparture)
    }

    pub fn label(self) -> &'static str {
        match self {
            LeaveKind::Annual => "Annual leave",
            LeaveKind::Emergency => "Emergency leave",
            LeaveKind::Sick => "Sick leave",
            LeaveKind::LateArrival => "Late arrival",
            LeaveKind::EarlyDeparture => "Early departure",
        }
    }
}

impl FromStr for LeaveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "annual" | "leave" => Ok(LeaveKind::Annual),
            "emergency" => Ok(LeaveKind::Emergency),
            "sick" => Ok(LeaveKind::Sick),
            "late" | "late_arrival" => Ok(LeaveKind::LateArrival),
            "early" | "early_departure" => Ok(LeaveKind::EarlyDeparture),
            other => Err(Error::InvalidInput(format!("unknown leave kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: String,
    #[serde(default)]
    pub version: u64,
    pub user_id: String,
    pub username: String,
    pub team_id: String,
    pub channel_id: String,
    pub approval_channel_id: String,
    /// Info post in the main channel
    pub post_id: Option<String>,
    /// Post carrying the approve/reject actions
    pub approval_post_id: Option<String>,
    pub kind: LeaveKind,
    pub dates: Vec<NaiveDate>,
    /// Arrival or departure time for partial-day kinds
    pub expected_time: Option<NaiveTime>,
    pub reason: String,
    pub status: LeaveStatus,
    pub decided_by: Option<String>,
    pub decided_by_name: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// Pending → Approved | Rejected, never by the requester
    pub fn decide(
        &mut self,
        status: LeaveStatus,
        actor_id: &str,
        actor_name: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != LeaveStatus::Pending {
            return Err(Error::AlreadyProcessed {
                status: self.status,
            });
        }
        if self.user_id == actor_id {
            return Err(Error::SelfAction);
        }
        if status == LeaveStatus::Pending {
            return Err(Error::InvalidInput(
                "a decision must approve or reject".to_string(),
            ));
        }
        self.status = status;
        self.decided_by = Some(actor_id.to_string());
        self.decided_by_name = Some(actor_name.to_string());
        self.decided_at = Some(at);
        self.reject_reason = reason;
        Ok(())
    }
}

impl Document for LeaveRequest {
    const COLLECTION: &'static str = "leave_requests";

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
