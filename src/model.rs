//! Domain types shared by the inspection pipeline, storage and API
//!
//! ## Ownership
//!
//! - [`Node`] belongs to the fleet inventory; the pipeline only reads it.
//! - [`Inspection`] is created once per node per cycle and never updated.
//! - [`Alert`] is created by the alert engine; later status changes come from
//!   the administrative surface and the notifier.
//!
//! Telemetry documents (`raw_data`, `analysis`) are opaque JSON. Anything the
//! pipeline reads from them goes through lenient accessors that fall back to
//! defaults instead of failing.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Last known liveness of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            "unknown" => Ok(NodeStatus::Unknown),
            other => Err(format!("unknown node status: {other}")),
        }
    }
}

/// A fleet member subject to periodic health probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,

    /// Inventory name, used in alert titles and logs
    pub name: String,

    pub ip: String,

    /// Base URL of the node agent; the prober appends `/inspect`
    pub url: String,

    pub enabled: bool,

    pub check_interval_secs: u64,

    pub status: NodeStatus,

    pub last_check_at: Option<DateTime<Utc>>,

    /// Shared secret sent with every probe
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

/// Inventory entry as seeded from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub ip: String,
    pub url: String,
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub token: Option<String>,
}

/// Severity tier assigned by the analysis collaborator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Severity {
    /// Only the highest tier raises alerts
    pub fn is_alerting(self) -> bool {
        self == Severity::Critical
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(Severity::Ok),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Numeric metrics derived from the raw telemetry payload
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InspectionMetrics {
    pub cpu_used: f64,
    pub memory_used: f64,
    pub load_avg: f64,
    pub ping_loss: f64,
}

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)").expect("valid number regex")
});

/// Read a number from a telemetry field
///
/// Agents report values either as JSON numbers or as strings with units
/// (`"42.5%"`, `" 0.31"`). Anything that does not start with a number is 0.
fn lenient_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => LEADING_NUMBER
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|n| n.is_finite())
            .unwrap_or_default(),
        _ => 0.0,
    }
}

impl InspectionMetrics {
    /// Best-effort extraction, absent or malformed values become 0
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            cpu_used: lenient_number(raw.get("cpu_used")),
            memory_used: lenient_number(raw.get("mem_used")),
            load_avg: lenient_number(raw.get("cpu_load")),
            ping_loss: lenient_number(raw.get("ping_loss")),
        }
    }
}

/// Structured view of the analysis document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisVerdict {
    pub alert: bool,
    pub level: Severity,
    pub summary: String,
    pub details: Vec<String>,
    pub plan: String,
}

impl AnalysisVerdict {
    /// Parse the analysis document
    ///
    /// Accepts an object, or a string holding a JSON object (language model
    /// back ends tend to return the verdict as message content). Returns
    /// `None` only when there is no object at all; missing or mistyped fields
    /// fall back to their defaults.
    pub fn parse(analysis: &Value) -> Option<Self> {
        let embedded;
        let object = match analysis {
            Value::Object(map) => map,
            Value::String(text) => {
                embedded = serde_json::from_str::<Value>(text).ok()?;
                embedded.as_object()?
            }
            _ => return None,
        };

        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };

        let details = match object.get("details") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        };

        let plan = match text("plan") {
            plan if plan.is_empty() => text("Plan"),
            plan => plan,
        };

        Some(Self {
            alert: object
                .get("alert")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
            level: object
                .get("level")
                .and_then(Value::as_str)
                .and_then(|level| level.parse().ok())
                .unwrap_or_default(),
            summary: text("summary"),
            details,
            plan,
        })
    }
}

/// Point-in-time result of probing one node in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    /// Assigned by storage once persisted
    pub id: Option<i64>,

    pub node_id: i64,

    /// Hostname as reported by the node itself
    pub hostname: String,

    pub ip: String,

    pub raw_data: Value,

    pub analysis: Value,

    pub alert: bool,

    pub level: Severity,

    pub metrics: InspectionMetrics,

    pub created_at: DateTime<Utc>,
}

/// Summary stored on outcomes the hub synthesises for unparseable replies
pub const BAD_RESPONSE_SUMMARY: &str = "bad response format";

/// Summary stored on outcomes the hub synthesises for unreachable nodes
pub const UNREACHABLE_SUMMARY: &str = "node unreachable";

impl Inspection {
    /// Build an inspection from a well-formed node reply
    pub fn from_report(node: &Node, hostname: String, raw_data: Value, analysis: Value) -> Self {
        let verdict = AnalysisVerdict::parse(&analysis).unwrap_or_default();
        let metrics = InspectionMetrics::from_raw(&raw_data);

        Self {
            id: None,
            node_id: node.id,
            hostname,
            ip: node.ip.clone(),
            raw_data,
            analysis,
            alert: verdict.alert,
            level: verdict.level,
            metrics,
            created_at: Utc::now(),
        }
    }

    /// Synthetic CRITICAL outcome for a node that replied with garbage
    pub fn bad_response(node: &Node) -> Self {
        Self::synthetic(node, json!({ "summary": BAD_RESPONSE_SUMMARY }))
    }

    /// Synthetic CRITICAL outcome for a node that could not be reached
    pub fn unreachable(node: &Node, error: &str) -> Self {
        Self::synthetic(
            node,
            json!({ "summary": UNREACHABLE_SUMMARY, "error": error }),
        )
    }

    fn synthetic(node: &Node, analysis: Value) -> Self {
        Self {
            id: None,
            node_id: node.id,
            hostname: node.name.clone(),
            ip: node.ip.clone(),
            raw_data: Value::Null,
            analysis,
            alert: true,
            level: Severity::Critical,
            metrics: InspectionMetrics::default(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of an alert record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Pending,
    Processing,
    Resolved,
    Ignored,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Pending => write!(f, "pending"),
            AlertStatus::Processing => write!(f, "processing"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Ignored => write!(f, "ignored"),
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlertStatus::Pending),
            "processing" => Ok(AlertStatus::Processing),
            "resolved" => Ok(AlertStatus::Resolved),
            "ignored" => Ok(AlertStatus::Ignored),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// Alert of record raised for a CRITICAL inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<i64>,
    pub node_id: i64,
    pub inspection_id: Option<i64>,
    pub level: Severity,
    pub title: String,
    pub summary: String,
    pub details: String,
    pub solution: String,
    pub status: AlertStatus,
    pub notified: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate alert counters for dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub pending: u64,
    pub critical: u64,
    pub warning: u64,
}
