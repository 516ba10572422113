//! Per-node health verdicts

use std::fmt;

use serde::Serialize;

use crate::scan::ReplicaRow;

/// A failed replica condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    ReadOnly,
    SessionExpired,
    FutureParts,
    PartsToCheck,
    ActiveReplicas,
    QueueSize,
    LogLag,
    /// Node answered but reported no replicated tables
    NoReplicas,
    /// Replica probe itself failed
    ProbeFailed,
}

impl Violation {
    /// Name of the `system.replicas` column that triggered the violation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "is_readonly",
            Self::SessionExpired => "is_session_expired",
            Self::FutureParts => "future_parts",
            Self::PartsToCheck => "parts_to_check",
            Self::ActiveReplicas => "active_replicas",
            Self::QueueSize => "queue_size",
            Self::LogLag => "log_max_index",
            Self::NoReplicas => "no_replicas",
            Self::ProbeFailed => "probe_failed",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violation and the row that caused it
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub violation: Violation,
    pub row: Option<ReplicaRow>,
}

impl Finding {
    /// `"<reason> : <row as JSON>"`
    pub fn diagnostic(&self) -> String {
        match &self.row {
            Some(row) => {
                let json = serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string());
                format!("{} : {}", self.violation, json)
            }
            None => self.violation.to_string(),
        }
    }
}

/// Verdict for one node in one scan
#[derive(Debug, Clone, PartialEq)]
pub struct HealthVerdict {
    pub passed: bool,
    /// Violations in the order they were found
    pub findings: Vec<Finding>,
}

impl HealthVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            findings: Vec::new(),
        }
    }

    pub fn fail(findings: Vec<Finding>) -> Self {
        Self {
            passed: false,
            findings,
        }
    }

    /// Verdict for a node whose replica probe did not return rows
    pub fn probe_failed() -> Self {
        Self::fail(vec![Finding {
            violation: Violation::ProbeFailed,
            row: None,
        }])
    }

    pub fn violations(&self) -> impl Iterator<Item = Violation> + '_ {
        self.findings.iter().map(|f| f.violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_labels() {
        assert_eq!(Violation::ReadOnly.to_string(), "is_readonly");
        assert_eq!(Violation::LogLag.to_string(), "log_max_index");
    }

    #[test]
    fn test_probe_failed_verdict() {
        let verdict = HealthVerdict::probe_failed();
        assert!(!verdict.passed);
        assert_eq!(
            verdict.violations().collect::<Vec<_>>(),
            vec![Violation::ProbeFailed]
        );
        assert_eq!(verdict.findings[0].diagnostic(), "probe_failed");
    }
}
