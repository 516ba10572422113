//! Replica health predicate
//!
//! Based on the replication monitoring query recommended for ClickHouse:
//! a replica is unhealthy if it is read-only, lost its coordination session,
//! or has too many pending parts. Strict mode also checks replica liveness,
//! queue depth and replication log lag, which requires the expensive columns.

use tracing::debug;

use crate::config::{HealthThresholds, ZeroReplicaPolicy};
use crate::scan::ReplicaRow;

use super::verdict::{Finding, HealthVerdict, Violation};

/// Applies the soft or strict predicate to one node's replica rows
#[derive(Debug, Clone, Default)]
pub struct ReplicaHealthEvaluator {
    thresholds: HealthThresholds,
    zero_replicas: ZeroReplicaPolicy,
}

impl ReplicaHealthEvaluator {
    pub fn new(thresholds: HealthThresholds, zero_replicas: ZeroReplicaPolicy) -> Self {
        Self {
            thresholds,
            zero_replicas,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Evaluate rows in the order the node returned them
    ///
    /// Stops at the first row that violates anything, in both modes.
    pub fn evaluate(&self, rows: &[ReplicaRow], soft_check: bool) -> HealthVerdict {
        if rows.is_empty() {
            return match self.zero_replicas {
                ZeroReplicaPolicy::Pass => HealthVerdict::pass(),
                ZeroReplicaPolicy::Fail => HealthVerdict::fail(vec![Finding {
                    violation: Violation::NoReplicas,
                    row: None,
                }]),
            };
        }

        for row in rows {
            let mut violations = self.basic_violations(row);
            if !soft_check {
                violations.extend(self.strict_violations(row));
            }

            if !violations.is_empty() {
                debug!(
                    table = %row.key(),
                    violations = ?violations,
                    soft_check,
                    "Replica check failed"
                );
                let findings = violations
                    .into_iter()
                    .map(|violation| Finding {
                        violation,
                        row: Some(row.clone()),
                    })
                    .collect();
                return HealthVerdict::fail(findings);
            }
        }

        HealthVerdict::pass()
    }

    fn basic_violations(&self, row: &ReplicaRow) -> Vec<Violation> {
        let t = &self.thresholds;
        let mut out = Vec::new();
        if row.is_readonly {
            out.push(Violation::ReadOnly);
        }
        if row.is_session_expired {
            out.push(Violation::SessionExpired);
        }
        if row.future_parts > t.max_future_parts {
            out.push(Violation::FutureParts);
        }
        if row.parts_to_check > t.max_parts_to_check {
            out.push(Violation::PartsToCheck);
        }
        out
    }

    /// Conditions on columns only present in the full `SELECT *` probe;
    /// absent columns are not judged.
    fn strict_violations(&self, row: &ReplicaRow) -> Vec<Violation> {
        let t = &self.thresholds;
        let mut out = Vec::new();
        if let (Some(active), Some(total)) = (row.active_replicas, row.total_replicas) {
            if active < total {
                out.push(Violation::ActiveReplicas);
            }
        }
        if row.queue_size > t.max_queue_size {
            out.push(Violation::QueueSize);
        }
        if row.log_lag().is_some_and(|lag| lag > t.max_log_lag) {
            out.push(Violation::LogLag);
        }
        out
    }
}
