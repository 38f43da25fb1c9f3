//! Alerts and alert dispatch.

use serde::{Deserialize, Serialize};
use tiergate_core::{DateTime, Utc, Uuid};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

/// Which rule produced an alert. Used for display and for suppressing
/// duplicate unresolved alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    HighFailureRate,
    SlowChecks,
    LargeBulkOperation,
    RepeatedAuthFailures,
    RapidEscalations,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub rule: AlertRule,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

impl Alert {
    #[must_use]
    pub fn new(rule: AlertRule, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule,
            severity,
            message: message.into(),
            actor: None,
            created_at: Utc::now(),
            resolved: false,
        }
    }

    #[must_use]
    pub fn for_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Where alerts go once raised. High and critical alerts are dispatched
/// the moment they fire; the rest on the periodic flush.
pub trait AlertSink: Send + Sync {
    fn dispatch(&self, alert: &Alert);
}

/// Default sink: structured log lines at a level matching the severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn dispatch(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => error!(
                alert_id = %alert.id,
                rule = ?alert.rule,
                severity = ?alert.severity,
                actor = alert.actor.as_deref().unwrap_or("-"),
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => warn!(
                alert_id = %alert.id,
                rule = ?alert.rule,
                "{}",
                alert.message
            ),
            AlertSeverity::Info => info!(
                alert_id = %alert.id,
                rule = ?alert.rule,
                "{}",
                alert.message
            ),
        }
    }
}
