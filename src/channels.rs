//! Sibling channel resolution
//!
//! A budget request is created from an origin channel such as
//! `budget-sale-dev`. Everything after the origin name is the environment
//! suffix (`-dev`), and every other role's channel is the role token plus
//! the same suffix:
//!
//! | role     | channel                          |
//! |----------|----------------------------------|
//! | origin   | `budget-sale<suffix>`            |
//! | partner  | `budget-partner-<slug><suffix>`  |
//! | review   | `budget-tlqc<suffix>`            |
//! | approval | `budget-approval<suffix>`        |
//! | finance  | `budget-finance<suffix>`         |
//!
//! Resolution runs once, at creation. The ids are stored on the request.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gateway::{ChannelDirectory, ChannelInfo};
use crate::model::{Role, RoleSlots};
use crate::{Error, Result};

/// Role → channel-name token table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNaming {
    pub prefix: String,
    pub origin: String,
    pub partner: String,
    pub review: String,
    pub approval: String,
    pub finance: String,
}

impl Default for ChannelNaming {
    fn default() -> Self {
        Self {
            prefix: "budget".to_string(),
            origin: "sale".to_string(),
            partner: "partner".to_string(),
            review: "tlqc".to_string(),
            approval: "approval".to_string(),
            finance: "finance".to_string(),
        }
    }
}

impl ChannelNaming {
    fn token(&self, role: Role) -> &str {
        match role {
            Role::Origin => &self.origin,
            Role::Partner => &self.partner,
            Role::Review => &self.review,
            Role::Approval => &self.approval,
            Role::Finance => &self.finance,
        }
    }

    /// Base name of a role's channel, without suffix
    pub fn base_name(&self, role: Role) -> String {
        format!("{}-{}", self.prefix, self.token(role))
    }

    /// Environment suffix of an origin channel name
    pub fn environment_suffix(&self, origin_name: &str) -> Result<String> {
        split_suffix(&self.base_name(Role::Origin), origin_name)
    }

    /// Expected channel name of a role for a partner and suffix
    pub fn sibling_name(&self, role: Role, partner: &str, suffix: &str) -> String {
        match role {
            Role::Partner => format!(
                "{}-{}{}",
                self.base_name(Role::Partner),
                partner_slug(partner),
                suffix
            ),
            _ => format!("{}{}", self.base_name(role), suffix),
        }
    }

    /// Resolve every role's channel from the origin channel.
    ///
    /// Any missing sibling fails the whole resolution.
    pub async fn resolve_all(
        &self,
        directory: &dyn ChannelDirectory,
        origin: &ChannelInfo,
        partner: &str,
    ) -> Result<RoleSlots<String>> {
        let suffix = self.environment_suffix(&origin.name)?;
        let mut channels = RoleSlots {
            origin: origin.id.clone(),
            ..RoleSlots::default()
        };

        for role in [Role::Partner, Role::Review, Role::Approval, Role::Finance] {
            let name = self.sibling_name(role, partner, &suffix);
            let id = directory
                .resolve_channel(&origin.team_id, &name)
                .await
                .map_err(|e| Error::ChannelResolution(format!("{}: {}", name, e)))?;
            debug!("Resolved {} channel {} → {}", role, name, id);
            *channels.get_mut(role) = id;
        }
        Ok(channels)
    }
}

/// Lowercase and trimmed, every inner space replaced by '-'
pub fn partner_slug(partner: &str) -> String {
    partner.trim().to_lowercase().replace(' ', "-")
}

/// Suffix of `name` after `base`: empty or starting with '-'
pub fn split_suffix(base: &str, name: &str) -> Result<String> {
    match name.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('-') => Ok(rest.to_string()),
        _ => Err(Error::ChannelResolution(format!(
            "channel '{}' is not a '{}' channel",
            name, base
        ))),
    }
}
