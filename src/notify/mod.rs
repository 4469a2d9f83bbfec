//! Outbound notification channels
//!
//! The alert engine only knows the [`Notifier`] contract. Which transport sits
//! behind it is decided once at start-up from `notify.channel`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{Channel, NotifyConfig};

pub mod discord;
pub mod webhook;

pub use discord::DiscordNotifier;
pub use webhook::WebhookNotifier;

/// Deliver one plaintext notification
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Timeout applied to every notification request
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the configured transport
///
/// Returns `None` when notifications are switched off.
pub fn from_config(config: &NotifyConfig) -> Result<Option<Arc<dyn Notifier>>> {
    if !config.enabled {
        return Ok(None);
    }

    let client = reqwest::Client::builder()
        .timeout(NOTIFY_TIMEOUT)
        .build()
        .context("failed to build notification HTTP client")?;

    let notifier: Arc<dyn Notifier> = match &config.channel {
        Channel::Webhook(webhook) => Arc::new(WebhookNotifier::new(client, webhook.url.clone())),
        Channel::Discord(discord) => Arc::new(DiscordNotifier::new(
            client,
            discord.url.clone(),
            discord.user_id.clone(),
        )),
    };

    Ok(Some(notifier))
}
