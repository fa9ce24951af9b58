//! Alert rows and the value types exchanged with the lifecycle store.

use std::ops::AddAssign;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::rule::Severity;

/// Alert type written for rule-driven alerts.
pub const RULE_ALERT_TYPE: &str = "rule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    /// Terminal. A re-breach opens a new row.
    Cleared,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Cleared => "cleared",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "cleared" => Ok(AlertStatus::Cleared),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub site_id: Option<Uuid>,
    pub device_id: Uuid,
    pub rule_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub status: AlertStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub muted_until: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.device_id, self.alert_type.clone())
    }
}

/// Identity of the single active alert a device may hold per type.
///
/// At most one active row exists per `(device_id, alert_type)`. The
/// `rule_id` on an alert records which rule opened it and takes no part in
/// matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub device_id: Uuid,
    pub alert_type: String,
}

impl AlertKey {
    pub fn new(device_id: Uuid, alert_type: impl Into<String>) -> Self {
        Self {
            device_id,
            alert_type: alert_type.into(),
        }
    }

    /// The rule-driven alert of a device.
    pub fn rule_alert(device_id: Uuid) -> Self {
        Self::new(device_id, RULE_ALERT_TYPE)
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        alert.device_id == self.device_id && alert.alert_type == self.alert_type
    }
}

/// `muted_until` for a mute of `minutes` starting at `now`.
pub fn mute_deadline(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, StoreError> {
    TimeDelta::try_minutes(minutes)
        .and_then(|mute| now.checked_add_signed(mute))
        .ok_or_else(|| {
            StoreError::InvalidInput(format!("mute of {minutes} minutes is out of range"))
        })
}

/// Input to `upsert_active_alert`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertAlert {
    pub site_id: Option<Uuid>,
    pub device_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub now: DateTime<Utc>,
}

impl UpsertAlert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.device_id, self.alert_type.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub alert: Alert,
    /// `true` when a new row was opened, `false` on a refresh.
    pub is_new: bool,
}

/// Active alert totals by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlertCounts {
    pub warning: u64,
    pub critical: u64,
    pub total: u64,
}

impl ActiveAlertCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Warning => self.warning += 1,
            Severity::Critical => self.critical += 1,
        }
        self.total += 1;
    }
}

impl AddAssign for ActiveAlertCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.warning += rhs.warning;
        self.critical += rhs.critical;
        self.total += rhs.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(device_id: Uuid, rule_id: Option<Uuid>) -> Alert {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            site_id: None,
            device_id,
            rule_id,
            alert_type: RULE_ALERT_TYPE.to_string(),
            severity: Severity::Warning,
            message: "m".to_string(),
            status: AlertStatus::Active,
            first_seen_at: now,
            last_seen_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
            muted_until: None,
        }
    }

    #[test]
    fn key_matches_device_and_type_regardless_of_rule() {
        let device = Uuid::new_v4();
        let a = alert(device, Some(Uuid::new_v4()));
        assert!(AlertKey::rule_alert(device).matches(&a));
        assert!(AlertKey::rule_alert(device).matches(&alert(device, None)));
        assert!(!AlertKey::new(device, "offline").matches(&a));
        assert!(!AlertKey::rule_alert(Uuid::new_v4()).matches(&a));
        assert_eq!(a.key(), AlertKey::rule_alert(device));
    }

    #[test]
    fn mute_deadline_rejects_overflow() {
        let now = Utc::now();
        assert_eq!(
            mute_deadline(now, 30).unwrap(),
            now + chrono::Duration::minutes(30)
        );
        assert!(matches!(
            mute_deadline(now, i64::MAX / 2),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn counts_accumulate() {
        let mut counts = ActiveAlertCounts::default();
        counts.record(Severity::Warning);
        counts.record(Severity::Critical);
        counts.record(Severity::Critical);
        let mut total = ActiveAlertCounts::default();
        total += counts;
        total += counts;
        assert_eq!(
            total,
            ActiveAlertCounts {
                warning: 2,
                critical: 4,
                total: 6
            }
        );
    }

    #[test]
    fn alert_type_serializes_as_type() {
        let a = alert(Uuid::new_v4(), None);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "rule");
        assert_eq!(json["status"], "active");
        assert_eq!(json["severity"], "warning");
    }
}
