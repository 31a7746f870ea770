//! Best-effort side effect execution

use std::future::Future;
use tracing::warn;

use super::EffectWarning;
use crate::gateway::{GatewayResult, NotificationGateway};

/// Runs gateway calls after a commit, collecting failures as warnings
pub(crate) struct Effects<'a> {
    gateway: &'a dyn NotificationGateway,
    warnings: Vec<EffectWarning>,
}

impl<'a> Effects<'a> {
    pub(crate) fn new(gateway: &'a dyn NotificationGateway) -> Self {
        Self {
            gateway,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn gateway(&self) -> &'a dyn NotificationGateway {
        self.gateway
    }

    /// Await one effect; on failure log it, record a warning and return `None`
    pub(crate) async fn attempt<T>(
        &mut self,
        effect: impl Into<String>,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> Option<T> {
        match call.await {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(effect, e.to_string());
                None
            }
        }
    }

    /// Record a failure that happened outside `attempt`
    pub(crate) fn record(&mut self, effect: impl Into<String>, error: String) {
        let effect = effect.into();
        warn!("{} via {} failed: {}", effect, self.gateway.name(), error);
        self.warnings.push(EffectWarning { effect, error });
    }

    pub(crate) fn into_warnings(self) -> Vec<EffectWarning> {
        self.warnings
    }
}

/// `@name` for a user id, `@all` when the id is empty or unknown
pub(crate) async fn mention(gateway: &dyn NotificationGateway, user_id: Option<&str>) -> String {
    match user_id.filter(|id| !id.is_empty()) {
        Some(id) => match gateway.display_name(id).await {
            Ok(name) => format!("@{}", name),
            Err(_) => "@all".to_string(),
        },
        None => "@all".to_string(),
    }
}
