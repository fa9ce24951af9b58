//! The body of one evaluation cycle.
//!
//! All reads happen up front; a read failure aborts the cycle before any
//! alert is written. Every (rule, device) pair is then evaluated, and each
//! device gets at most one write for its rule alert: an upsert with its most
//! severe breach, or a clear. A failed write is logged and counted without
//! stopping the rest of the fleet.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use heatwatch_core::{
    ActiveAlertCounts, AlertKey, AlertRule, AlertRuleRecord, DeviceSnapshot, RuleKind, UpsertAlert,
    ENGINE_STATUS_KEY, RULE_ALERT_TYPE,
};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AlertEngine, CycleReport};
use crate::error::{CyclePhase, EngineError, PhaseExt};
use crate::evaluator::{Decision, DeviceIndex, EvaluationInputs, RuleEvaluator, WindowIndex};
use crate::resolver::{MetricResolver, MetricSource, SnapshotMetrics, TelemetryMetrics};
use crate::schedule_cache::ScheduleCache;

impl AlertEngine {
    pub(super) async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let mut report = CycleReport::default();

        // ── Reads ───────────────────────────────────────────────────

        let records = self
            .deps
            .rules
            .get_all_enabled_rules()
            .await
            .phase(CyclePhase::LoadRules)?;
        report.rules_loaded = records.len();

        let mut orgs: BTreeSet<Uuid> = records.iter().map(|r| r.org_id).collect();
        let rules = validate_rules(records, &mut report);

        let devices = self
            .deps
            .telemetry
            .get_device_last_seen()
            .await
            .phase(CyclePhase::LoadDevices)?;
        report.devices = devices.len();
        orgs.extend(devices.iter().map(|d| d.org_id));

        // Device -> rule that opened its active rule alert.
        let active: HashMap<Uuid, Option<Uuid>> = self
            .deps
            .alerts
            .list_active_alerts()
            .await
            .phase(CyclePhase::LoadActiveAlerts)?
            .into_iter()
            .filter(|a| a.is_active() && a.alert_type == RULE_ALERT_TYPE)
            .map(|a| (a.device_id, a.rule_id))
            .collect();

        let index = DeviceIndex::new(&devices);
        let pairs: Vec<(&AlertRule, &DeviceSnapshot)> = rules
            .iter()
            .flat_map(|rule| index.targets(rule).into_iter().map(move |d| (rule, d)))
            .collect();

        let telemetry = self.load_latest_telemetry(&pairs).await?;
        let windows = self.load_windows(&pairs, now).await?;

        let mut schedules = ScheduleCache::new(self.deps.schedules.as_ref(), now);
        for (_, device) in &pairs {
            schedules
                .get(device.site_id)
                .await
                .phase(CyclePhase::LoadSchedule)?;
        }

        debug!(
            rules = rules.len(),
            devices = devices.len(),
            pairs = pairs.len(),
            active = active.len(),
            latest_values = telemetry.len(),
            windows = windows.len(),
            sites = schedules.len(),
            "cycle inputs loaded"
        );

        // ── Evaluate and write ──────────────────────────────────────

        let legacy = SnapshotMetrics;
        let resolver = MetricResolver::new(vec![&telemetry as &dyn MetricSource, &legacy]);
        let inputs = EvaluationInputs {
            resolver: &resolver,
            windows: &windows,
            now,
        };

        let mut outcomes: HashMap<Uuid, DeviceOutcome> = HashMap::new();

        for (rule, device) in &pairs {
            report.pairs_evaluated += 1;
            let ctx = schedules.cached(device.site_id);
            let outcome = outcomes.entry(device.id).or_default();
            outcome.evaluated.insert(rule.id);

            match RuleEvaluator::evaluate(rule, device, ctx, &inputs) {
                Decision::Breach { severity, message } => {
                    let worse = match &outcome.worst {
                        Some(current) => severity > current.severity,
                        None => true,
                    };
                    if worse {
                        outcome.worst = Some(UpsertAlert {
                            site_id: device.site_id,
                            device_id: device.id,
                            rule_id: Some(rule.id),
                            alert_type: RULE_ALERT_TYPE.to_string(),
                            severity,
                            message,
                            now,
                        });
                    }
                }
                Decision::Resolved => {
                    outcome.resolved.insert(rule.id);
                }
                Decision::Muted => {
                    debug!(rule_id = %rule.id, device_id = %device.id, "offline alert muted");
                    report.muted += 1;
                }
                Decision::Undecided(reason) => {
                    debug!(
                        rule_id = %rule.id,
                        device_id = %device.id,
                        reason = %reason,
                        "no decision"
                    );
                    report.skipped += 1;
                }
            }
        }

        for device in &devices {
            let Some(outcome) = outcomes.remove(&device.id) else {
                continue;
            };
            if let Some(input) = outcome.worst {
                self.open_or_refresh(input, &mut report).await;
            } else if let Some(owner) = active.get(&device.id) {
                if outcome.clears(*owner) {
                    self.clear(device, now, &mut report).await;
                }
            }
        }

        // ── Status ──────────────────────────────────────────────────

        let mut totals = ActiveAlertCounts::default();
        for org_id in &orgs {
            totals += self
                .deps
                .alerts
                .get_active_alert_counts_for_org(*org_id)
                .await
                .phase(CyclePhase::CountAlerts)?;
        }
        report.active_counts = totals;

        let payload = json!({
            "lastRunAt": now,
            "rulesLoaded": report.rules_loaded,
            "activeAlertsTotal": totals.total,
            "activeCounts": totals,
        });
        if let Err(e) = self.deps.status.upsert_status(ENGINE_STATUS_KEY, payload).await {
            warn!(error = %e, key = ENGINE_STATUS_KEY, "failed to write engine status");
        }
        if let Err(e) = self.deps.status.mark_heartbeat(now).await {
            warn!(error = %e, "failed to write heartbeat");
        }

        Ok(report)
    }

    /// Latest values for every (device, metric) a threshold rule needs,
    /// fetched in bounded batches of device ids.
    async fn load_latest_telemetry(
        &self,
        pairs: &[(&AlertRule, &DeviceSnapshot)],
    ) -> Result<TelemetryMetrics, EngineError> {
        let mut device_ids: Vec<Uuid> = Vec::new();
        let mut seen_devices = HashSet::new();
        let mut metrics: BTreeSet<String> = BTreeSet::new();

        for (rule, device) in pairs {
            if !rule.kind.needs_latest_value() {
                continue;
            }
            metrics.insert(rule.metric.clone());
            if seen_devices.insert(device.id) {
                device_ids.push(device.id);
            }
        }

        let mut latest = TelemetryMetrics::new();
        if device_ids.is_empty() {
            return Ok(latest);
        }

        let metrics: Vec<String> = metrics.into_iter().collect();
        for chunk in device_ids.chunks(self.config.telemetry_batch_size.max(1)) {
            let samples = self
                .deps
                .telemetry
                .get_latest_telemetry_for_metrics(chunk, &metrics)
                .await
                .phase(CyclePhase::LoadTelemetry)?;
            latest.extend(samples);
        }
        Ok(latest)
    }

    async fn load_windows(
        &self,
        pairs: &[(&AlertRule, &DeviceSnapshot)],
        now: DateTime<Utc>,
    ) -> Result<WindowIndex, EngineError> {
        let mut windows: WindowIndex = HashMap::new();

        for (rule, device) in pairs {
            let RuleKind::RateOfChange { window_sec, .. } = &rule.kind else {
                continue;
            };
            let window_sec = *window_sec;
            let key = (device.id, rule.metric.clone(), window_sec);
            if windows.contains_key(&key) {
                continue;
            }
            let bounds = self
                .deps
                .telemetry
                .get_telemetry_window_bounds(device.id, &rule.metric, window_sec, now)
                .await
                .phase(CyclePhase::LoadWindows)?;
            windows.insert(key, bounds);
        }
        Ok(windows)
    }

    async fn open_or_refresh(&self, input: UpsertAlert, report: &mut CycleReport) {
        let device_id = input.device_id;
        let rule_id = input.rule_id;

        let outcome = match self.deps.alerts.upsert_active_alert(input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    device_id = %device_id,
                    rule_id = ?rule_id,
                    error = %e,
                    "alert upsert failed"
                );
                report.write_errors += 1;
                return;
            }
        };
        report.upserts += 1;

        if !outcome.is_new {
            return;
        }
        report.new_alerts += 1;
        debug!(alert_id = %outcome.alert.id, device_id = %device_id, "alert opened");

        for result in self.deps.notifier.send_alert_notification(&outcome.alert).await {
            if result.success {
                report.notifications_sent += 1;
            } else {
                report.notification_failures += 1;
            }
        }
    }

    async fn clear(&self, device: &DeviceSnapshot, now: DateTime<Utc>, report: &mut CycleReport) {
        let key = AlertKey::rule_alert(device.id);
        match self.deps.alerts.clear_alert_if_exists(&key, now).await {
            Ok(true) => {
                debug!(device_id = %device.id, "alert cleared");
                report.clears += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(device_id = %device.id, error = %e, "alert clear failed");
                report.write_errors += 1;
            }
        }
    }
}

/// What the rules targeting one device decided this cycle.
#[derive(Default)]
struct DeviceOutcome {
    /// Most severe breach; the first one wins a tie.
    worst: Option<UpsertAlert>,
    evaluated: HashSet<Uuid>,
    resolved: HashSet<Uuid>,
}

impl DeviceOutcome {
    /// Whether an active rule alert opened by `owner` should be cleared,
    /// given that no rule breached. The owning rule must have resolved; an
    /// alert whose rule is gone or no longer targets the device clears once
    /// any other rule resolves.
    fn clears(&self, owner: Option<Uuid>) -> bool {
        match owner {
            Some(rule_id) if self.evaluated.contains(&rule_id) => self.resolved.contains(&rule_id),
            _ => !self.resolved.is_empty(),
        }
    }
}

fn validate_rules(
    records: Vec<AlertRuleRecord>,
    report: &mut CycleReport,
) -> Vec<AlertRule> {
    let mut rules = Vec::with_capacity(records.len());
    for record in records {
        let rule_id = record.id;
        match AlertRule::try_from(record) {
            Ok(rule) if rule.enabled => rules.push(rule),
            Ok(_) => debug!(rule_id = %rule_id, "disabled rule returned by store, ignoring"),
            Err(e) => {
                warn!(rule_id = %rule_id, error = %e, "invalid rule definition, skipping");
                report.invalid_rules += 1;
            }
        }
    }
    rules
}
