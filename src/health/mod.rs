//! Replica health evaluation
//!
//! This module provides:
//! - The soft/strict replica predicate applied to one node's `system.replicas` rows
//! - Per-node verdicts carrying the violated conditions and offending rows
//! - A configurable verdict for nodes without replicated tables

mod evaluator;
mod verdict;

pub use evaluator::ReplicaHealthEvaluator;
pub use verdict::{Finding, HealthVerdict, Violation};
