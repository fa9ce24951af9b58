//! Per-rule-type breach tests, severity resolution and alert messages.

use heatwatch_core::{AlertRule, RuleKind, ScheduleContext, Severity, WindowBounds};

/// `value` breaches a threshold rule. Strict comparison on both sides.
pub(crate) fn threshold_breached(kind: &RuleKind, value: f64) -> bool {
    match kind {
        RuleKind::ThresholdAbove { threshold } => value > *threshold,
        RuleKind::ThresholdBelow { threshold } => value < *threshold,
        _ => false,
    }
}

pub(crate) fn rate_of_change_breached(bounds: &WindowBounds, threshold: f64) -> bool {
    bounds.abs_delta() >= threshold
}

pub(crate) fn offline_breached(age_secs: i64, grace_sec: i64) -> bool {
    age_secs >= grace_sec
}

/// Rule severity adjusted for the site's schedule.
///
/// Threshold readings are expected to go out of range while a site is load
/// shedding, so critical threshold alerts are downgraded to warning. Rate of
/// change and offline rules keep their declared severity. TOU peak has no
/// effect.
pub(crate) fn resolve_severity(rule: &AlertRule, ctx: ScheduleContext) -> Severity {
    match rule.severity {
        Severity::Critical if ctx.is_load_shedding && rule.kind.is_threshold() => Severity::Warning,
        severity => severity,
    }
}

pub(crate) fn threshold_message(rule: &AlertRule, value: f64) -> String {
    let (direction, threshold) = match rule.kind {
        RuleKind::ThresholdAbove { threshold } => ("above", threshold),
        RuleKind::ThresholdBelow { threshold } => ("below", threshold),
        _ => ("outside", f64::NAN),
    };
    format!(
        "{}: {} {:.1} {} threshold {:.1}",
        rule.name, rule.metric, value, direction, threshold
    )
}

pub(crate) fn rate_of_change_message(
    rule: &AlertRule,
    bounds: &WindowBounds,
    threshold: f64,
    window_sec: i64,
) -> String {
    format!(
        "{}: {} changed by {:.1} within {}s (threshold {:.1})",
        rule.name,
        rule.metric,
        bounds.last.value - bounds.first.value,
        window_sec,
        threshold
    )
}

pub(crate) fn offline_message(rule: &AlertRule, age_secs: i64, grace_sec: i64) -> String {
    format!(
        "{}: device offline for {}s (grace {}s)",
        rule.name, age_secs, grace_sec
    )
}
