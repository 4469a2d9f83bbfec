use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::model::NodeSpec;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (inspections older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./inspector.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    /// Notification channel (optional - absent disables notifications)
    pub notify: Option<NotifyConfig>,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Administrative HTTP surface (optional - absent disables it)
    pub api: Option<ApiSettings>,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// Knobs of the periodic inspection cycle
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Unit of the linear backoff between attempts
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            retry_times: default_retry_times(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl CheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    10
}

fn default_retry_times() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_cooldown_secs() -> u64 {
    300
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    pub channel: Channel,
}

fn default_subject_prefix() -> String {
    "[Fleet Inspector]".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Channel {
    Discord(Discord),
    Webhook(Webhook),
}

impl Channel {
    fn url(&self) -> &str {
        match self {
            Channel::Discord(discord) => &discord.url,
            Channel::Webhook(webhook) => &webhook.url,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Bearer token required on every route when set
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub ip: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub check_interval_secs: u64,
    pub token: Option<String>,
}

impl From<&NodeConfig> for NodeSpec {
    fn from(node: &NodeConfig) -> Self {
        NodeSpec {
            name: node.name.clone(),
            ip: node.ip.clone(),
            url: node.url.trim_end_matches('/').to_string(),
            enabled: node.enabled,
            check_interval_secs: node.check_interval_secs,
            token: node.token.clone(),
        }
    }
}

/// Upper bound for every duration setting, 30 days
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

fn ensure_duration(name: &str, secs: u64, min: u64) -> anyhow::Result<()> {
    if secs < min {
        bail!("{name} must be at least {min}");
    }
    if secs > MAX_DURATION_SECS {
        bail!("{name} must be at most {MAX_DURATION_SECS}");
    }
    Ok(())
}

impl Config {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let check = &self.check;
        ensure_duration("check.interval_secs", check.interval_secs, 1)?;
        ensure_duration("check.timeout_secs", check.timeout_secs, 1)?;
        ensure_duration("check.backoff_secs", check.backoff_secs, 0)?;
        ensure_duration("alert.cooldown_secs", self.alert.cooldown_secs, 0)?;
        if check.max_concurrent == 0 {
            bail!("check.max_concurrent must be at least 1");
        }
        if check.retry_times == 0 {
            bail!("check.retry_times must be at least 1");
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                bail!("node with url '{}' has an empty name", node.url);
            }
            if !names.insert(node.name.as_str()) {
                bail!("duplicate node name '{}'", node.name);
            }
            if !(node.url.starts_with("http://") || node.url.starts_with("https://")) {
                bail!(
                    "node '{}' has url '{}' without http:// or https:// scheme",
                    node.name,
                    node.url
                );
            }
        }

        if let Some(notify) = &self.notify
            && notify.enabled
            && notify.channel.url().trim().is_empty()
        {
            bail!("notify.channel.url must not be empty");
        }

        Ok(())
    }

    pub fn node_specs(&self) -> Vec<NodeSpec> {
        self.nodes.iter().map(NodeSpec::from).collect()
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file '{path}'"))?;
    parse_config(&file_content)
}
