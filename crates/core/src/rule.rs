//! Alert rule definitions.
//!
//! Rules are persisted as flat records ([`AlertRuleRecord`]) whose optional
//! numeric fields only make sense for some rule types. Before evaluation a
//! record is validated into an [`AlertRule`], whose [`RuleKind`] carries
//! exactly the parameters its type needs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleDefinitionError;

// ── Severity ──────────────────────────────────────────────────

/// Ordered so that `Critical > Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = RuleDefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(RuleDefinitionError::UnknownSeverity(s.to_string())),
        }
    }
}

// ── Rule kinds ────────────────────────────────────────────────

pub const THRESHOLD_ABOVE: &str = "threshold_above";
pub const THRESHOLD_BELOW: &str = "threshold_below";
pub const RATE_OF_CHANGE: &str = "rate_of_change";
pub const OFFLINE_WINDOW: &str = "offline_window";
pub const COMPOSITE: &str = "composite";

/// Upper bound for `roc_window_sec` and `offline_grace_sec` (one year).
pub const MAX_WINDOW_SEC: i64 = 366 * 24 * 60 * 60;

/// Detection logic of a rule, with the parameters each variant requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RuleKind {
    ThresholdAbove { threshold: f64 },
    ThresholdBelow { threshold: f64 },
    RateOfChange { threshold: f64, window_sec: i64 },
    OfflineWindow { grace_sec: i64 },
    /// Declared in the rule schema but without defined combination
    /// semantics. Evaluates to "no decision".
    Composite,
}

impl RuleKind {
    /// Build a kind from the persisted tag and optional parameters.
    pub fn from_parts(
        rule_type: &str,
        threshold: Option<f64>,
        roc_window_sec: Option<i64>,
        offline_grace_sec: Option<i64>,
    ) -> Result<Self, RuleDefinitionError> {
        match rule_type {
            THRESHOLD_ABOVE => Ok(RuleKind::ThresholdAbove {
                threshold: require_threshold(THRESHOLD_ABOVE, threshold)?,
            }),
            THRESHOLD_BELOW => Ok(RuleKind::ThresholdBelow {
                threshold: require_threshold(THRESHOLD_BELOW, threshold)?,
            }),
            RATE_OF_CHANGE => Ok(RuleKind::RateOfChange {
                threshold: require_threshold(RATE_OF_CHANGE, threshold)?,
                window_sec: require_positive(RATE_OF_CHANGE, "roc_window_sec", roc_window_sec)?,
            }),
            OFFLINE_WINDOW => Ok(RuleKind::OfflineWindow {
                grace_sec: require_positive(
                    OFFLINE_WINDOW,
                    "offline_grace_sec",
                    offline_grace_sec,
                )?,
            }),
            COMPOSITE => Ok(RuleKind::Composite),
            other => Err(RuleDefinitionError::UnknownRuleType(other.to_string())),
        }
    }

    /// Threshold rules compare the latest metric value against a limit and
    /// are the only ones subject to load-shedding downgrade.
    pub fn is_threshold(&self) -> bool {
        matches!(
            self,
            RuleKind::ThresholdAbove { .. } | RuleKind::ThresholdBelow { .. }
        )
    }

    /// Whether evaluation needs the latest value of the rule's metric.
    pub fn needs_latest_value(&self) -> bool {
        self.is_threshold()
    }
}

fn require_threshold(
    rule_type: &'static str,
    threshold: Option<f64>,
) -> Result<f64, RuleDefinitionError> {
    let value = threshold.ok_or(RuleDefinitionError::MissingField {
        rule_type,
        field: "threshold",
    })?;
    if !value.is_finite() {
        return Err(RuleDefinitionError::NonFiniteThreshold);
    }
    Ok(value)
}

fn require_positive(
    rule_type: &'static str,
    field: &'static str,
    value: Option<i64>,
) -> Result<i64, RuleDefinitionError> {
    let value = value.ok_or(RuleDefinitionError::MissingField { rule_type, field })?;
    if value <= 0 {
        return Err(RuleDefinitionError::NonPositive { field, value });
    }
    if value > MAX_WINDOW_SEC {
        return Err(RuleDefinitionError::OutOfRange {
            field,
            value,
            max: MAX_WINDOW_SEC,
        });
    }
    Ok(value)
}

// ── Persisted record ──────────────────────────────────────────

/// Flat rule row as stored by the rule CRUD surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub site_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub metric: String,
    pub rule_type: String,
    pub threshold: Option<f64>,
    pub roc_window_sec: Option<i64>,
    pub offline_grace_sec: Option<i64>,
    pub enabled: bool,
    pub severity: String,
    pub snooze_default_sec: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

// ── Validated rule ────────────────────────────────────────────

/// Which devices a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Device(Uuid),
    Site(Uuid),
    Org(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub org_id: Uuid,
    pub site_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub metric: String,
    pub kind: RuleKind,
    pub enabled: bool,
    pub severity: Severity,
    pub snooze_default_sec: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

impl AlertRule {
    /// The narrowest scope set on the rule: device, then site, then org.
    pub fn scope(&self) -> RuleScope {
        match (self.device_id, self.site_id) {
            (Some(device_id), _) => RuleScope::Device(device_id),
            (None, Some(site_id)) => RuleScope::Site(site_id),
            (None, None) => RuleScope::Org(self.org_id),
        }
    }
}

impl TryFrom<AlertRuleRecord> for AlertRule {
    type Error = RuleDefinitionError;

    fn try_from(record: AlertRuleRecord) -> Result<Self, Self::Error> {
        let kind = RuleKind::from_parts(
            record.rule_type.trim(),
            record.threshold,
            record.roc_window_sec,
            record.offline_grace_sec,
        )?;
        let severity = record.severity.parse()?;

        Ok(Self {
            id: record.id,
            org_id: record.org_id,
            site_id: record.site_id,
            device_id: record.device_id,
            metric: record.metric,
            kind,
            enabled: record.enabled,
            severity,
            snooze_default_sec: record.snooze_default_sec,
            name: record.name,
            description: record.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rule_type: &str) -> AlertRuleRecord {
        AlertRuleRecord {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            site_id: None,
            device_id: None,
            metric: "supply_temp".to_string(),
            rule_type: rule_type.to_string(),
            threshold: None,
            roc_window_sec: None,
            offline_grace_sec: None,
            enabled: true,
            severity: "warning".to_string(),
            snooze_default_sec: None,
            name: "Supply temp".to_string(),
            description: None,
        }
    }

    #[test]
    fn threshold_rule_requires_threshold() {
        let err = AlertRule::try_from(record("threshold_above")).unwrap_err();
        assert_eq!(
            err,
            RuleDefinitionError::MissingField {
                rule_type: "threshold_above",
                field: "threshold"
            }
        );

        let mut rec = record("threshold_above");
        rec.threshold = Some(55.0);
        let rule = AlertRule::try_from(rec).unwrap();
        assert_eq!(rule.kind, RuleKind::ThresholdAbove { threshold: 55.0 });
    }

    #[test]
    fn rate_of_change_requires_window() {
        let mut rec = record("rate_of_change");
        rec.threshold = Some(10.0);
        let err = AlertRule::try_from(rec.clone()).unwrap_err();
        assert!(matches!(
            err,
            RuleDefinitionError::MissingField {
                field: "roc_window_sec",
                ..
            }
        ));

        rec.roc_window_sec = Some(600);
        let rule = AlertRule::try_from(rec).unwrap();
        assert_eq!(
            rule.kind,
            RuleKind::RateOfChange {
                threshold: 10.0,
                window_sec: 600
            }
        );
    }

    #[test]
    fn offline_window_rejects_zero_grace() {
        let mut rec = record("offline_window");
        rec.offline_grace_sec = Some(0);
        let err = AlertRule::try_from(rec).unwrap_err();
        assert_eq!(
            err,
            RuleDefinitionError::NonPositive {
                field: "offline_grace_sec",
                value: 0
            }
        );
    }

    #[test]
    fn oversized_windows_rejected() {
        let mut rec = record("rate_of_change");
        rec.threshold = Some(10.0);
        rec.roc_window_sec = Some(10_000_000_000_000);
        assert_eq!(
            AlertRule::try_from(rec.clone()).unwrap_err(),
            RuleDefinitionError::OutOfRange {
                field: "roc_window_sec",
                value: 10_000_000_000_000,
                max: MAX_WINDOW_SEC
            }
        );

        rec.roc_window_sec = Some(MAX_WINDOW_SEC);
        assert!(AlertRule::try_from(rec).is_ok());

        let mut rec = record("offline_window");
        rec.offline_grace_sec = Some(i64::MAX);
        assert!(matches!(
            AlertRule::try_from(rec).unwrap_err(),
            RuleDefinitionError::OutOfRange {
                field: "offline_grace_sec",
                ..
            }
        ));
    }

    #[test]
    fn offline_window_ignores_threshold() {
        let mut rec = record("offline_window");
        rec.offline_grace_sec = Some(300);
        rec.threshold = None;
        let rule = AlertRule::try_from(rec).unwrap();
        assert_eq!(rule.kind, RuleKind::OfflineWindow { grace_sec: 300 });
        assert!(!rule.kind.is_threshold());
    }

    #[test]
    fn composite_needs_no_parameters() {
        let rule = AlertRule::try_from(record("composite")).unwrap();
        assert_eq!(rule.kind, RuleKind::Composite);
    }

    #[test]
    fn unknown_rule_type_and_severity_rejected() {
        assert_eq!(
            AlertRule::try_from(record("sliding_median")).unwrap_err(),
            RuleDefinitionError::UnknownRuleType("sliding_median".to_string())
        );

        let mut rec = record("threshold_below");
        rec.threshold = Some(5.0);
        rec.severity = "info".to_string();
        assert_eq!(
            AlertRule::try_from(rec).unwrap_err(),
            RuleDefinitionError::UnknownSeverity("info".to_string())
        );
    }

    #[test]
    fn non_finite_threshold_rejected() {
        let mut rec = record("threshold_above");
        rec.threshold = Some(f64::NAN);
        assert_eq!(
            AlertRule::try_from(rec).unwrap_err(),
            RuleDefinitionError::NonFiniteThreshold
        );
    }

    #[test]
    fn scope_prefers_device_then_site() {
        let device = Uuid::new_v4();
        let site = Uuid::new_v4();
        let mut rec = record("composite");
        rec.device_id = Some(device);
        rec.site_id = Some(site);
        let rule = AlertRule::try_from(rec.clone()).unwrap();
        assert_eq!(rule.scope(), RuleScope::Device(device));

        rec.device_id = None;
        let rule = AlertRule::try_from(rec.clone()).unwrap();
        assert_eq!(rule.scope(), RuleScope::Site(site));

        rec.site_id = None;
        let rule = AlertRule::try_from(rec.clone()).unwrap();
        assert_eq!(rule.scope(), RuleScope::Org(rec.org_id));
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert!(Severity::Critical > Severity::Warning);
    }
}
