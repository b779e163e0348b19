//! Alerts synthesized when a snapshot crosses a static threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert delivered on the `alerts` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Subsystem that produced the alert (e.g. "system-monitoring").
    pub source: String,
    pub acknowledged: bool,
}

impl Alert {
    /// Create an unacknowledged alert stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("alert-{}", uuid::Uuid::new_v4().simple()),
            title: title.into(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            source: source.into(),
            acknowledged: false,
        }
    }
}
