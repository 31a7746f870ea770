//! Mattermost REST client

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    Action, ChannelDirectory, ChannelInfo, Form, GatewayError, GatewayResult, NotificationGateway,
};

/// Bot-token client for the Mattermost v4 API
pub struct MattermostClient {
    base_url: String,
    bot_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct User {
    username: String,
}

#[derive(Serialize)]
struct Post<'a> {
    channel_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<serde_json::Value>,
}

/// Partial update: omitted props keep the post's buttons
#[derive(Serialize)]
struct PostPatch<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<serde_json::Value>,
}

impl MattermostClient {
    pub fn new(base_url: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Attachment props carrying interactive buttons; no buttons clears
    /// the attachments entirely
    fn props(actions: Option<&[Action]>) -> Option<serde_json::Value> {
        let actions = actions?;
        if actions.is_empty() {
            return Some(json!({ "attachments": [] }));
        }
        let buttons: Vec<_> = actions
            .iter()
            .map(|a| {
                json!({
                    "name": a.name,
                    "type": "button",
                    "integration": { "url": a.url, "context": a.context },
                })
            })
            .collect();
        Some(json!({ "attachments": [{ "actions": buttons }] }))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.bot_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn do_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> GatewayResult<T> {
        Ok(self.send(method, path, body).await?.json().await?)
    }
}

#[async_trait]
impl ChannelDirectory for MattermostClient {
    async fn channel(&self, channel_id: &str) -> GatewayResult<ChannelInfo> {
        self.do_json::<(), _>(Method::GET, &format!("/api/v4/channels/{}", channel_id), None)
            .await
    }

    async fn resolve_channel(&self, team_id: &str, name: &str) -> GatewayResult<String> {
        let path = format!("/api/v4/teams/{}/channels/name/{}", team_id, name);
        match self.do_json::<(), IdOnly>(Method::GET, &path, None).await {
            Ok(channel) => Ok(channel.id),
            Err(GatewayError::Api { status: 404, .. }) => {
                Err(GatewayError::NotFound(format!("channel {}", name)))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl NotificationGateway for MattermostClient {
    fn name(&self) -> &str {
        "mattermost"
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        root_id: Option<&str>,
        actions: Option<&[Action]>,
    ) -> GatewayResult<String> {
        let post = Post {
            channel_id,
            message: text,
            root_id,
            props: Self::props(actions),
        };
        let created: IdOnly = self
            .do_json(Method::POST, "/api/v4/posts", Some(&post))
            .await?;
        Ok(created.id)
    }

    async fn edit_message(
        &self,
        message_id: &str,
        channel_id: &str,
        text: &str,
        actions: Option<&[Action]>,
    ) -> GatewayResult<()> {
        let patch = PostPatch {
            message: text,
            props: Self::props(actions),
        };
        debug!("Editing post {} in {}", message_id, channel_id);
        self.send(
            Method::PUT,
            &format!("/api/v4/posts/{}/patch", message_id),
            Some(&patch),
        )
        .await?;
        Ok(())
    }

    async fn open_form(&self, trigger_id: &str, url: &str, form: &Form) -> GatewayResult<()> {
        let body = json!({
            "trigger_id": trigger_id,
            "url": url,
            "dialog": form,
        });
        self.send(Method::POST, "/api/v4/actions/dialogs/open", Some(&body))
            .await?;
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> GatewayResult<String> {
        let user: User = self
            .do_json::<(), _>(Method::GET, &format!("/api/v4/users/{}", user_id), None)
            .await?;
        Ok(user.username)
    }

    async fn direct_message(&self, user_id: &str, text: &str) -> GatewayResult<String> {
        let me: IdOnly = self
            .do_json::<(), _>(Method::GET, "/api/v4/users/me", None)
            .await?;
        let members = [user_id, me.id.as_str()];
        let channel: IdOnly = self
            .do_json(Method::POST, "/api/v4/channels/direct", Some(&members[..]))
            .await?;
        self.post_message(&channel.id, text, None, None).await
    }
}
