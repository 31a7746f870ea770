//! Chatflow: guarded approval workflows over chat
//!
//! Multi-party workflows whose steps are driven by messages and interactive
//! forms exchanged through a chat server, with durable state in a document
//! store:
//! - **Budget**: sale → partner content → review → payment → approval → finance,
//!   with reject-at-any-step and a return-for-rework path
//! - **Attendance**: check-in → breaks → check-out, one record per user per day
//! - **Leave**: pending → approved | rejected, never by the requester
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Inbound action (form / button / CLI)   │
//! └────────────────────┬─────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │   Workflow engine                        │
//! │   load → guard → transition → commit     │
//! └──────────┬────────────────────┬──────────┘
//!            ▼                    ▼
//! ┌────────────────────┐ ┌───────────────────┐
//! │ Repository (store) │ │ Gateway (effects) │
//! └────────────────────┘ └───────────────────┘
//! ```
//!
//! The store is the source of truth. Chat messages are a best-effort
//! projection of it: once a transition is committed, a failed message edit
//! is reported as a warning and never rolls the transition back.

pub mod channels;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod model;
pub mod store;
pub mod workflow;

// Re-exports for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use gateway::{ChannelDirectory, GatewayError, NotificationGateway};
pub use model::{
    AttendanceRecord, AttendanceStatus, BudgetRequest, BudgetStep, LeaveKind, LeaveRequest,
    LeaveStatus,
};
pub use store::{Document, Repository};
pub use workflow::{AttendanceService, BudgetEngine, EffectWarning, LeaveService, Outcome};

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Request {id} has already been rejected")]
    AlreadyRejected { id: String },

    #[error("Request {id} is already completed")]
    AlreadyCompleted { id: String },

    #[error("Wrong step: request is at step {current}, this action needs step {expected}")]
    WrongStep {
        current: BudgetStep,
        expected: BudgetStep,
    },

    #[error("Channel resolution failed: {0}")]
    ChannelResolution(String),

    #[error("You cannot approve or reject your own request")]
    SelfAction,

    #[error("Request has already been {status}")]
    AlreadyProcessed { status: LeaveStatus },

    #[error("@{username} already checked in today at {at}")]
    AlreadyCheckedIn { username: String, at: String },

    #[error("@{username} has not checked in today")]
    NotCheckedIn { username: String },

    #[error("@{username} is already on break")]
    AlreadyOnBreak { username: String },

    #[error("@{username} is not on break")]
    NotOnBreak { username: String },

    #[error("@{username} is on break, end the break before checking out")]
    BreakOpen { username: String },

    #[error("@{username} already checked out today at {at}")]
    AlreadyCheckedOut { username: String, at: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrent modification of {id}, reload and try again")]
    Conflict { id: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
