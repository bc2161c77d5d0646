//! Verdict types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outage severity judged for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "Normal")]
    Normal,
    #[serde(alias = "Suspected")]
    Suspected,
    #[serde(alias = "Confirmed")]
    Confirmed,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Suspected => "suspected",
            Severity::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOrigin {
    /// Validated reply from the reasoning service
    Reasoned,
    /// Report carried no evidence; the service was not consulted
    NoEvidence,
    /// Service failed or replied with something uninterpretable
    Fallback,
}

/// Structured output of the analysis stage, created fresh every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Advisory notify recommendation; the state machine has the final say
    pub notify: bool,
    /// Human-readable rationale surfaced in notifications
    pub summary: String,
    pub origin: VerdictOrigin,
}

impl Verdict {
    /// Verdict built from a validated service reply
    pub fn reasoned(severity: Severity, confidence: f64, notify: bool, summary: impl Into<String>) -> Self {
        Self {
            severity,
            confidence,
            notify,
            summary: summary.into(),
            origin: VerdictOrigin::Reasoned,
        }
    }

    /// Fail-closed default: nothing is wrong, do not notify
    pub fn conservative_default() -> Self {
        Self {
            severity: Severity::Normal,
            confidence: 0.0,
            notify: false,
            summary: "Analysis unavailable; no assessment was made.".to_string(),
            origin: VerdictOrigin::Fallback,
        }
    }

    /// Verdict for a report without any evidence
    pub fn no_evidence() -> Self {
        Self {
            severity: Severity::Normal,
            confidence: 0.0,
            notify: false,
            summary: "No evidence could be collected this cycle.".to_string(),
            origin: VerdictOrigin::NoEvidence,
        }
    }

    /// Whether the state machine may act on this verdict
    pub fn is_actionable(&self) -> bool {
        self.origin == VerdictOrigin::Reasoned
    }
}
