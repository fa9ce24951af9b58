//! Per-(rule, device) decision logic.
//!
//! The evaluator is pure: every input it needs (latest values, window
//! bounds, schedule context) is fetched by the cycle beforehand. It returns a
//! [`Decision`] and leaves all writes to the caller.
//!
//! - `threshold_above` / `threshold_below` compare the latest resolved value
//! - `rate_of_change` compares `|last - first|` over the rule window
//! - `offline_window` compares the device's silence against the grace period
//! - `composite` has no defined semantics and never decides

mod matching;
mod targets;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use heatwatch_core::{AlertRule, DeviceSnapshot, RuleKind, ScheduleContext, Severity, WindowBounds};
use uuid::Uuid;

use crate::resolver::MetricResolver;

pub use targets::DeviceIndex;

use matching::{
    offline_breached, offline_message, rate_of_change_breached, rate_of_change_message,
    resolve_severity, threshold_breached, threshold_message,
};

/// Window bounds fetched for this cycle, keyed by (device, metric, window).
/// `None` records a window with fewer than two samples.
pub type WindowIndex = HashMap<(Uuid, String, i64), Option<WindowBounds>>;

/// Outcome of evaluating one rule against one device.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Condition breached: open or refresh the alert.
    Breach { severity: Severity, message: String },
    /// Condition evaluated and not breached: clear any active alert.
    Resolved,
    /// Offline breach suppressed by the device-level snooze.
    Muted,
    /// Not enough information to decide. Nothing is written.
    Undecided(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoValue,
    Malformed,
    InsufficientWindow,
    NeverSeen,
    Unsupported,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NoValue => "no value",
            SkipReason::Malformed => "malformed value",
            SkipReason::InsufficientWindow => "fewer than two samples in window",
            SkipReason::NeverSeen => "device never seen",
            SkipReason::Unsupported => "rule type not supported",
        };
        f.write_str(s)
    }
}

/// Everything the evaluator reads, prepared once per cycle.
pub struct EvaluationInputs<'a> {
    pub resolver: &'a MetricResolver<'a>,
    pub windows: &'a WindowIndex,
    pub now: DateTime<Utc>,
}

pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn evaluate(
        rule: &AlertRule,
        device: &DeviceSnapshot,
        schedule: ScheduleContext,
        inputs: &EvaluationInputs<'_>,
    ) -> Decision {
        match &rule.kind {
            RuleKind::ThresholdAbove { .. } | RuleKind::ThresholdBelow { .. } => {
                let Some(resolved) = inputs.resolver.resolve(device, &rule.metric) else {
                    return Decision::Undecided(SkipReason::NoValue);
                };
                if !resolved.value.is_finite() {
                    tracing::warn!(
                        rule_id = %rule.id,
                        device_id = %device.id,
                        metric = %rule.metric,
                        source = resolved.source,
                        "non-finite metric value, skipping"
                    );
                    return Decision::Undecided(SkipReason::Malformed);
                }
                if threshold_breached(&rule.kind, resolved.value) {
                    Decision::Breach {
                        severity: resolve_severity(rule, schedule),
                        message: threshold_message(rule, resolved.value),
                    }
                } else {
                    Decision::Resolved
                }
            }

            RuleKind::RateOfChange {
                threshold,
                window_sec,
            } => {
                let key = (device.id, rule.metric.clone(), *window_sec);
                let Some(Some(bounds)) = inputs.windows.get(&key) else {
                    return Decision::Undecided(SkipReason::InsufficientWindow);
                };
                if !bounds.first.value.is_finite() || !bounds.last.value.is_finite() {
                    tracing::warn!(
                        rule_id = %rule.id,
                        device_id = %device.id,
                        metric = %rule.metric,
                        "non-finite window bound, skipping"
                    );
                    return Decision::Undecided(SkipReason::Malformed);
                }
                if rate_of_change_breached(bounds, *threshold) {
                    Decision::Breach {
                        severity: resolve_severity(rule, schedule),
                        message: rate_of_change_message(rule, bounds, *threshold, *window_sec),
                    }
                } else {
                    Decision::Resolved
                }
            }

            RuleKind::OfflineWindow { grace_sec } => {
                let Some(age_secs) = device.offline_age_secs(inputs.now) else {
                    return Decision::Undecided(SkipReason::NeverSeen);
                };
                if !offline_breached(age_secs, *grace_sec) {
                    return Decision::Resolved;
                }
                if device.is_muted_at(inputs.now) {
                    return Decision::Muted;
                }
                Decision::Breach {
                    severity: resolve_severity(rule, schedule),
                    message: offline_message(rule, age_secs, *grace_sec),
                }
            }

            RuleKind::Composite => Decision::Undecided(SkipReason::Unsupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use heatwatch_core::TelemetrySample;
    use serde_json::json;

    use crate::resolver::{MetricSource, SnapshotMetrics, TelemetryMetrics};

    fn rule(kind: RuleKind, severity: Severity) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            site_id: None,
            device_id: None,
            metric: "supply_temp".to_string(),
            kind,
            enabled: true,
            severity,
            snooze_default_sec: None,
            name: "Supply temp".to_string(),
            description: None,
        }
    }

    fn device(last_seen_ago: Option<i64>, data: serde_json::Value) -> DeviceSnapshot {
        DeviceSnapshot {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            site_id: None,
            last_seen_at: last_seen_ago.map(|s| Utc::now() - Duration::seconds(s)),
            muted_until: None,
            data,
        }
    }

    fn sample(device_id: Uuid, value: f64) -> TelemetrySample {
        TelemetrySample {
            device_id,
            metric: "supply_temp".to_string(),
            value,
            ts: Utc::now(),
        }
    }

    fn eval(
        rule: &AlertRule,
        device: &DeviceSnapshot,
        telemetry: &TelemetryMetrics,
        windows: &WindowIndex,
    ) -> Decision {
        let legacy = SnapshotMetrics;
        let resolver = MetricResolver::new(vec![telemetry as &dyn MetricSource, &legacy]);
        let inputs = EvaluationInputs {
            resolver: &resolver,
            windows,
            now: Utc::now(),
        };
        RuleEvaluator::evaluate(rule, device, ScheduleContext::default(), &inputs)
    }

    #[test]
    fn threshold_breach_and_resolve() {
        let r = rule(RuleKind::ThresholdAbove { threshold: 55.0 }, Severity::Warning);
        let d = device(Some(10), json!({}));
        let mut t = TelemetryMetrics::new();
        t.extend([sample(d.id, 60.0)]);

        match eval(&r, &d, &t, &WindowIndex::new()) {
            Decision::Breach { severity, message } => {
                assert_eq!(severity, Severity::Warning);
                assert!(message.contains("60.0 above threshold 55.0"));
            }
            other => panic!("expected breach, got {other:?}"),
        }

        let mut t = TelemetryMetrics::new();
        t.extend([sample(d.id, 50.0)]);
        assert_eq!(eval(&r, &d, &t, &WindowIndex::new()), Decision::Resolved);
    }

    #[test]
    fn missing_value_is_undecided_not_zero() {
        let r = rule(RuleKind::ThresholdBelow { threshold: 5.0 }, Severity::Warning);
        let d = device(Some(10), json!({}));
        assert_eq!(
            eval(&r, &d, &TelemetryMetrics::new(), &WindowIndex::new()),
            Decision::Undecided(SkipReason::NoValue)
        );
    }

    #[test]
    fn legacy_blob_is_used_when_table_has_no_row() {
        let r = rule(RuleKind::ThresholdAbove { threshold: 55.0 }, Severity::Warning);
        let d = device(Some(10), json!({"supplyTemp": 70}));
        assert!(matches!(
            eval(&r, &d, &TelemetryMetrics::new(), &WindowIndex::new()),
            Decision::Breach { .. }
        ));
    }

    #[test]
    fn nan_value_is_malformed() {
        let r = rule(RuleKind::ThresholdAbove { threshold: 55.0 }, Severity::Warning);
        let d = device(Some(10), json!({}));
        let mut t = TelemetryMetrics::new();
        t.extend([sample(d.id, f64::NAN)]);
        assert_eq!(
            eval(&r, &d, &t, &WindowIndex::new()),
            Decision::Undecided(SkipReason::Malformed)
        );
    }

    #[test]
    fn rate_of_change_needs_a_window() {
        let r = rule(
            RuleKind::RateOfChange { threshold: 10.0, window_sec: 600 },
            Severity::Critical,
        );
        let d = device(Some(10), json!({}));
        let t = TelemetryMetrics::new();

        let mut windows = WindowIndex::new();
        assert_eq!(
            eval(&r, &d, &t, &windows),
            Decision::Undecided(SkipReason::InsufficientWindow)
        );

        windows.insert((d.id, "supply_temp".to_string(), 600), None);
        assert_eq!(
            eval(&r, &d, &t, &windows),
            Decision::Undecided(SkipReason::InsufficientWindow)
        );

        windows.insert(
            (d.id, "supply_temp".to_string(), 600),
            Some(WindowBounds {
                first: sample(d.id, 30.0),
                last: sample(d.id, 45.0),
            }),
        );
        assert!(matches!(
            eval(&r, &d, &t, &windows),
            Decision::Breach { severity: Severity::Critical, .. }
        ));

        windows.insert(
            (d.id, "supply_temp".to_string(), 600),
            Some(WindowBounds {
                first: sample(d.id, 30.0),
                last: sample(d.id, 35.0),
            }),
        );
        assert_eq!(eval(&r, &d, &t, &windows), Decision::Resolved);
    }

    #[test]
    fn offline_window_breach_mute_and_never_seen() {
        let r = rule(RuleKind::OfflineWindow { grace_sec: 300 }, Severity::Critical);
        let t = TelemetryMetrics::new();
        let w = WindowIndex::new();

        let stale = device(Some(20 * 60), json!({}));
        match eval(&r, &stale, &t, &w) {
            Decision::Breach { severity, .. } => assert_eq!(severity, Severity::Critical),
            other => panic!("expected breach, got {other:?}"),
        }

        let mut muted = device(Some(20 * 60), json!({}));
        muted.muted_until = Some(Utc::now() + Duration::hours(1));
        assert_eq!(eval(&r, &muted, &t, &w), Decision::Muted);

        let mut mute_expired = device(Some(20 * 60), json!({}));
        mute_expired.muted_until = Some(Utc::now() - Duration::hours(1));
        assert!(matches!(eval(&r, &mute_expired, &t, &w), Decision::Breach { .. }));

        let fresh = device(Some(30), json!({}));
        assert_eq!(eval(&r, &fresh, &t, &w), Decision::Resolved);

        let never = device(None, json!({}));
        assert_eq!(
            eval(&r, &never, &t, &w),
            Decision::Undecided(SkipReason::NeverSeen)
        );
    }

    #[test]
    fn composite_fails_closed() {
        let r = rule(RuleKind::Composite, Severity::Critical);
        let d = device(Some(99_999), json!({"supply_temp": 1000}));
        assert_eq!(
            eval(&r, &d, &TelemetryMetrics::new(), &WindowIndex::new()),
            Decision::Undecided(SkipReason::Unsupported)
        );
    }
}
