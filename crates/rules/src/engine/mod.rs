//! [`AlertEngine`]: the single-flight evaluation cycle.
//!
//! One engine is created at process start and shared by whatever drives it
//! (the worker's interval loop, tests). A call to [`AlertEngine::run_once`]
//! while another cycle is in flight returns [`CycleOutcome::Skipped`]
//! immediately; it is never queued. Every failure inside a cycle, panics
//! included, is turned into [`CycleOutcome::Failed`] and the guard is
//! released on every exit path.

mod cycle;
mod report;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use heatwatch_core::config::EngineConfig;
use heatwatch_core::{AlertStore, RuleStore, ScheduleProvider, StatusSink, TelemetryStore};
use heatwatch_notify::AlertNotifier;
use tracing::{error, info, warn};

use crate::error::EngineError;

pub use report::{CycleOutcome, CycleReport, EvaluationCycleState};

// ── Collaborators ───────────────────────────────────────────────────

/// Everything the engine reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub rules: Arc<dyn RuleStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub schedules: Arc<dyn ScheduleProvider>,
    pub alerts: Arc<dyn AlertStore>,
    pub status: Arc<dyn StatusSink>,
    pub notifier: Arc<dyn AlertNotifier>,
}

impl Collaborators {
    /// Wire every store contract to one backend (Postgres, in-memory).
    pub fn from_backend<B>(backend: Arc<B>, notifier: Arc<dyn AlertNotifier>) -> Self
    where
        B: RuleStore + TelemetryStore + ScheduleProvider + AlertStore + StatusSink + 'static,
    {
        Self {
            rules: backend.clone(),
            telemetry: backend.clone(),
            schedules: backend.clone(),
            alerts: backend.clone(),
            status: backend,
            notifier,
        }
    }
}

// ── Guard ───────────────────────────────────────────────────────────

/// Holds the running flag for the lifetime of one cycle.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct AlertEngine {
    deps: Collaborators,
    config: EngineConfig,
    running: AtomicBool,
    last: Mutex<EvaluationCycleState>,
}

impl AlertEngine {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            deps,
            config: EngineConfig::default(),
            running: AtomicBool::new(false),
            last: Mutex::new(EvaluationCycleState::default()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the guard flag and the last completed cycle's metrics.
    pub fn state(&self) -> EvaluationCycleState {
        let mut state = self
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        state.running = self.is_running();
        state
    }

    /// Run one evaluation cycle at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CycleOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            warn!("evaluation cycle already in progress, skipping");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        info!(now = %now, "evaluation cycle started");

        let result = match AssertUnwindSafe(self.run_cycle(now)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(EngineError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                self.record(now, &report);
                info!(
                    rules = report.rules_loaded,
                    pairs = report.pairs_evaluated,
                    new_alerts = report.new_alerts,
                    clears = report.clears,
                    skipped = report.skipped,
                    muted = report.muted,
                    write_errors = report.write_errors,
                    active = report.active_counts.total,
                    duration_ms = report.duration_ms,
                    "evaluation cycle finished"
                );
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                error!(
                    error = %e,
                    phase = e.phase().map(|p| p.as_str()).unwrap_or("unknown"),
                    "evaluation cycle failed"
                );
                CycleOutcome::Failed(e)
            }
        }
    }

    fn record(&self, now: DateTime<Utc>, report: &CycleReport) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.last_run_at = Some(now);
        last.rules_loaded = report.rules_loaded;
        last.active_alerts_total = report.active_counts.total;
        last.active_counts = report.active_counts;
        last.last_report = Some(report.clone());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
