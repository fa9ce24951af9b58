use chrono::{DateTime, Utc};
use heatwatch_core::ActiveAlertCounts;
use serde::Serialize;

use crate::error::EngineError;

/// Counters for one completed evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Enabled rule records returned by the rule store, valid or not.
    pub rules_loaded: usize,
    pub invalid_rules: usize,
    pub devices: usize,
    pub pairs_evaluated: usize,
    pub upserts: usize,
    pub new_alerts: usize,
    pub clears: usize,
    /// Pairs with no decision (missing value, short window, unsupported type).
    pub skipped: usize,
    /// Offline breaches suppressed by a device snooze.
    pub muted: usize,
    /// Individual upsert/clear calls that failed.
    pub write_errors: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub active_counts: ActiveAlertCounts,
    pub duration_ms: u64,
}

/// Result of [`AlertEngine::run_once`](super::AlertEngine::run_once).
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the guard.
    Skipped,
    Failed(EngineError),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Process-wide view of the engine: the guard flag plus the metrics of the
/// last completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCycleState {
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub rules_loaded: usize,
    pub active_alerts_total: u64,
    pub active_counts: ActiveAlertCounts,
    pub last_report: Option<CycleReport>,
}
