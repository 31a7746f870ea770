//! In-memory gateway that records every call

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{
    Action, ChannelDirectory, ChannelInfo, Form, GatewayError, GatewayResult, NotificationGateway,
};

/// A message as currently displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub id: String,
    pub channel_id: String,
    pub root_id: Option<String>,
    pub text: String,
    pub actions: Vec<Action>,
    /// Number of times the message was edited
    pub edits: usize,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    channels: HashMap<String, ChannelInfo>,
    users: HashMap<String, String>,
    messages: Vec<RecordedMessage>,
    direct: Vec<(String, String)>,
    forms: Vec<(String, String, Form)>,
    failing: HashSet<String>,
}

/// Gateway double: hands out sequential ids and keeps the latest view of
/// every message. Channels can be marked as failing to exercise best-effort
/// side effects.
#[derive(Default)]
pub struct RecordingGateway {
    inner: Mutex<Inner>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a channel, returning its id (`ch-<name>`)
    pub fn add_channel(&self, team_id: &str, name: &str) -> String {
        let id = format!("ch-{}", name);
        self.lock().channels.insert(
            id.clone(),
            ChannelInfo {
                id: id.clone(),
                name: name.to_string(),
                team_id: team_id.to_string(),
            },
        );
        id
    }

    pub fn add_user(&self, user_id: &str, name: &str) {
        self.lock()
            .users
            .insert(user_id.to_string(), name.to_string());
    }

    /// Make every post and edit into the channel fail
    pub fn fail_channel(&self, channel_id: &str) {
        self.lock().failing.insert(channel_id.to_string());
    }

    pub fn heal_channel(&self, channel_id: &str) {
        self.lock().failing.remove(channel_id);
    }

    pub fn message(&self, id: &str) -> Option<RecordedMessage> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    /// Every message in a channel, replies included, in posting order
    pub fn messages_in(&self, channel_id: &str) -> Vec<RecordedMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect()
    }

    /// Top-level messages in a channel
    pub fn posts_in(&self, channel_id: &str) -> Vec<RecordedMessage> {
        self.messages_in(channel_id)
            .into_iter()
            .filter(|m| m.root_id.is_none())
            .collect()
    }

    /// Threaded replies under a message
    pub fn replies_to(&self, root_id: &str) -> Vec<RecordedMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.root_id.as_deref() == Some(root_id))
            .cloned()
            .collect()
    }

    /// Direct messages sent to a user
    pub fn direct_messages(&self, user_id: &str) -> Vec<String> {
        self.lock()
            .direct
            .iter()
            .filter(|(to, _)| to == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn forms_opened(&self) -> usize {
        self.lock().forms.len()
    }

    fn check(inner: &Inner, channel_id: &str) -> GatewayResult<()> {
        if inner.failing.contains(channel_id) {
            return Err(GatewayError::Unavailable(format!("channel {}", channel_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelDirectory for RecordingGateway {
    async fn channel(&self, channel_id: &str) -> GatewayResult<ChannelInfo> {
        self.lock()
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("channel {}", channel_id)))
    }

    async fn resolve_channel(&self, team_id: &str, name: &str) -> GatewayResult<String> {
        self.lock()
            .channels
            .values()
            .find(|c| c.team_id == team_id && c.name == name)
            .map(|c| c.id.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("channel {}", name)))
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        root_id: Option<&str>,
        actions: Option<&[Action]>,
    ) -> GatewayResult<String> {
        let mut inner = self.lock();
        Self::check(&inner, channel_id)?;

        inner.next_id += 1;
        let id = format!("msg-{}", inner.next_id);
        inner.messages.push(RecordedMessage {
            id: id.clone(),
            channel_id: channel_id.to_string(),
            root_id: root_id.map(str::to_string),
            text: text.to_string(),
            actions: actions.map(<[Action]>::to_vec).unwrap_or_default(),
            edits: 0,
        });
        debug!("Recorded post {} in {}", id, channel_id);
        Ok(id)
    }

    async fn edit_message(
        &self,
        message_id: &str,
        channel_id: &str,
        text: &str,
        actions: Option<&[Action]>,
    ) -> GatewayResult<()> {
        let mut inner = self.lock();
        Self::check(&inner, channel_id)?;

        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| GatewayError::NotFound(format!("message {}", message_id)))?;
        message.text = text.to_string();
        if let Some(actions) = actions {
            message.actions = actions.to_vec();
        }
        message.edits += 1;
        Ok(())
    }

    async fn open_form(&self, trigger_id: &str, url: &str, form: &Form) -> GatewayResult<()> {
        self.lock()
            .forms
            .push((trigger_id.to_string(), url.to_string(), form.clone()));
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> GatewayResult<String> {
        self.lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("user {}", user_id)))
    }

    async fn direct_message(&self, user_id: &str, text: &str) -> GatewayResult<String> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("dm-{}", inner.next_id);
        inner.direct.push((user_id.to_string(), text.to_string()));
        Ok(id)
    }
}
