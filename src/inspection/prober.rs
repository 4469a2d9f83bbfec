//! Node Prober - one health pull against one node
//!
//! ## Failure taxonomy
//!
//! - **Connectivity failure** (connect error, timeout, non-2xx status,
//!   unreadable body) is returned as `Err` so the dispatcher can retry it.
//! - **Format failure** (the node answered but not with the
//!   `{hostname, raw_data, analysis}` envelope) is final. It comes back as
//!   `Ok` holding a synthetic CRITICAL inspection, since retrying will not fix
//!   a broken agent.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use crate::model::{Inspection, Node};

/// Header carrying the per-node shared secret
pub const TOKEN_HEADER: &str = "X-INSPECTOR-TOKEN";

/// Single attempt at pulling an inspection from a node
#[async_trait]
pub trait NodeProbe: Send + Sync {
    async fn pull(&self, node: &Node) -> Result<Inspection>;
}

/// Envelope served by the node agent on `/inspect`
#[derive(Debug, Deserialize)]
struct InspectReport {
    hostname: String,
    #[serde(default)]
    raw_data: Value,
    #[serde(default)]
    analysis: Value,
}

/// Turn a response body into an inspection, degrading bad envelopes
pub fn parse_report(node: &Node, body: &str) -> Inspection {
    match serde_json::from_str::<InspectReport>(body) {
        Ok(report) => Inspection::from_report(node, report.hostname, report.raw_data, report.analysis),
        Err(e) => {
            warn!(node = %node.name, "bad response format: {e}");
            Inspection::bad_response(node)
        }
    }
}

/// Prober speaking HTTP to the node agent
///
/// One client is shared by every probe of every cycle so connections are
/// pooled.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NodeProbe for HttpProber {
    #[instrument(skip_all, fields(node = %node.name))]
    async fn pull(&self, node: &Node) -> Result<Inspection> {
        let url = format!("{}/inspect", node.url.trim_end_matches('/'));

        trace!("requesting inspection from {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &node.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            "inspection received"
        );

        Ok(parse_report(node, &body))
    }
}
