//! Configuration loading and management

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::channels::ChannelNaming;
use crate::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat server connection
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Document store
    #[serde(default)]
    pub store: StoreConfig,

    /// Budget channel naming
    #[serde(default)]
    pub budget: ChannelNaming,

    /// Attendance and leave settings
    #[serde(default)]
    pub attendance: AttendanceConfig,
}

impl Config {
    /// Load configuration from file or default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            // Try .chatflow/config.toml in current directory
            let local = PathBuf::from(".chatflow/config.toml");
            if local.exists() {
                return Some(local);
            }

            // Try ~/.chatflow/config.toml
            dirs::home_dir().map(|h| h.join(".chatflow/config.toml"))
        });

        let mut config = match config_path {
            Some(p) if p.exists() => {
                debug!("Loading config from {}", p.display());
                let content = std::fs::read_to_string(&p)?;
                toml::from_str(&content)?
            }
            Some(p) if path.is_some() => {
                return Err(Error::Config(format!("{} does not exist", p.display())));
            }
            _ => Config::default(),
        };

        config.expand()?;
        Ok(config)
    }

    /// Expand `${VAR}` and `~` in string values
    fn expand(&mut self) -> Result<()> {
        self.gateway.base_url = expand(&self.gateway.base_url)?;
        self.gateway.bot_token = expand(&self.gateway.bot_token)?;
        self.gateway.callback_url = expand(&self.gateway.callback_url)?;
        self.store.database = PathBuf::from(expand(&self.store.database.to_string_lossy())?);
        Ok(())
    }

    /// Offset of the working day
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.attendance.utc_offset)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

fn expand(value: &str) -> Result<String> {
    shellexpand::full(value)
        .map(|v| v.into_owned())
        .map_err(|e| Error::Config(format!("cannot expand '{}': {}", value, e)))
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a fixed offset
pub fn parse_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    let invalid = || Error::Config(format!("invalid UTC offset '{}'", value));

    if value.eq_ignore_ascii_case("z") || value.is_empty() {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Chat server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Chat server base URL
    pub base_url: String,

    /// Bot access token (supports `${ENV_VAR}`)
    pub bot_token: String,

    /// Base URL of this service, used for interactive action callbacks
    pub callback_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8065".to_string(),
            bot_token: String::new(),
            callback_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(".chatflow/chatflow.db"),
        }
    }
}

/// How a leave decision reaches the requester
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveNotify {
    /// Reply in the info post's thread
    #[default]
    Thread,
    /// Direct message to the requester
    Direct,
}

/// Attendance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Main attendance channel name (without environment suffix)
    pub channel: String,

    /// Leave approval channel name (without environment suffix)
    pub approval_channel: String,

    /// UTC offset of the working day, e.g. "+07:00"
    pub utc_offset: String,

    pub leave_notify: LeaveNotify,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            channel: "attendance".to_string(),
            approval_channel: "attendance-approval".to_string(),
            utc_offset: "+07:00".to_string(),
            leave_notify: LeaveNotify::Thread,
        }
    }
}

/// Initialize the .chatflow directory under `root`, returning the config path
pub fn init(root: &Path, force: bool) -> Result<PathBuf> {
    let dir = root.join(".chatflow");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    let config_path = dir.join("config.toml");
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )));
    }

    std::fs::write(&config_path, Config::default().to_toml()?)?;
    Ok(config_path)
}
