//! Chat server collaborators
//!
//! The engines only ever talk to the chat server through two traits:
//! - [`ChannelDirectory`]: channel lookup by id and by team-scoped name
//! - [`NotificationGateway`]: post, edit, reply, forms and user lookup
//!
//! Implementations:
//! - [`MattermostClient`]: REST client with a bot token
//! - [`RecordingGateway`]: in-memory, records every call (tests, dry runs)

mod mattermost;
mod recording;

pub use mattermost::MattermostClient;
pub use recording::{RecordedMessage, RecordingGateway};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gateway failures
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Basic channel information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub team_id: String,
}

/// Interactive button attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Button label
    pub name: String,
    /// Callback URL invoked when the button is pressed
    pub url: String,
    /// Context echoed back to the callback
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Action {
    /// Button whose callback receives the request id
    pub fn button(name: &str, base_url: &str, path: &str, request_id: &str) -> Self {
        let mut context = BTreeMap::new();
        context.insert("request_id".to_string(), request_id.to_string());
        Self {
            name: name.to_string(),
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
            context,
        }
    }
}

/// Rendered message content
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct View {
    pub text: String,
    /// `None` leaves existing buttons alone, `Some(vec![])` strips them
    pub actions: Option<Vec<Action>>,
}

impl View {
    /// Text only, buttons untouched on edit
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: None,
        }
    }

    /// Text with its buttons removed
    pub fn settled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Some(Vec::new()),
        }
    }

    pub fn with_actions(text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            text: text.into(),
            actions: Some(actions),
        }
    }
}

/// Interactive form (dialog) opened in response to a button press
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub title: String,
    #[serde(default)]
    pub callback_id: Option<String>,
    pub elements: Vec<FormElement>,
    #[serde(default)]
    pub submit_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormElement {
    pub display_name: String,
    pub name: String,
    /// "text", "textarea" or "select"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub optional: bool,
}

/// Channel lookup
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Channel info by id
    async fn channel(&self, channel_id: &str) -> GatewayResult<ChannelInfo>;

    /// Channel id by team and name
    async fn resolve_channel(&self, team_id: &str, name: &str) -> GatewayResult<String>;
}

/// Side-effect sink for workflow transitions
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Gateway name for logs
    fn name(&self) -> &str;

    /// Post a new message, optionally as a threaded reply, returning its id
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        root_id: Option<&str>,
        actions: Option<&[Action]>,
    ) -> GatewayResult<String>;

    /// Edit a message in place
    async fn edit_message(
        &self,
        message_id: &str,
        channel_id: &str,
        text: &str,
        actions: Option<&[Action]>,
    ) -> GatewayResult<()>;

    /// Open an interactive form for the user who pressed a button
    async fn open_form(&self, trigger_id: &str, url: &str, form: &Form) -> GatewayResult<()>;

    /// Display name of a user id
    async fn display_name(&self, user_id: &str) -> GatewayResult<String>;

    /// Direct message to a user
    async fn direct_message(&self, user_id: &str, text: &str) -> GatewayResult<String>;

    /// Edit the message behind `handle`, or post a new one when there is no
    /// handle yet. Returns the handle to keep.
    async fn upsert_view(
        &self,
        handle: Option<&str>,
        channel_id: &str,
        view: &View,
    ) -> GatewayResult<String> {
        match handle {
            Some(id) => {
                self.edit_message(id, channel_id, &view.text, view.actions.as_deref())
                    .await?;
                Ok(id.to_string())
            }
            None => {
                self.post_message(channel_id, &view.text, None, view.actions.as_deref())
                    .await
            }
        }
    }
}
