//! Row shapes returned by the queries in [`crate::pg`].

use chrono::{DateTime, NaiveTime, Utc};
use heatwatch_core::{
    weekdays_from_iso, Alert, AlertRuleRecord, DeviceSnapshot, ScheduleWindow, StoreError,
    TelemetrySample, WindowBounds,
};
use uuid::Uuid;

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RuleRow {
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

impl From<RuleRow> for AlertRuleRecord {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            site_id: row.site_id,
            device_id: row.device_id,
            metric: row.metric,
            rule_type: row.rule_type,
            threshold: row.threshold,
            roc_window_sec: row.roc_window_sec,
            offline_grace_sec: row.offline_grace_sec,
            enabled: row.enabled,
            severity: row.severity,
            snooze_default_sec: row.snooze_default_sec,
            name: row.name,
            description: row.description,
        }
    }
}

// ── Devices & telemetry ─────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeviceRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub site_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub muted_until: Option<DateTime<Utc>>,
    pub data: Option<serde_json::Value>,
}

impl From<DeviceRow> for DeviceSnapshot {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            site_id: row.site_id,
            last_seen_at: row.last_seen_at,
            muted_until: row.muted_until,
            data: row.data.unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TelemetryRow {
    pub device_id: Uuid,
    pub metric: String,
    pub value: f64,
    pub ts: DateTime<Utc>,
}

impl From<TelemetryRow> for TelemetrySample {
    fn from(row: TelemetryRow) -> Self {
        Self {
            device_id: row.device_id,
            metric: row.metric,
            value: row.value,
            ts: row.ts,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WindowRow {
    pub samples: i64,
    pub first_value: f64,
    pub first_ts: DateTime<Utc>,
    pub last_value: f64,
    pub last_ts: DateTime<Utc>,
}

impl WindowRow {
    pub fn into_bounds(self, device_id: Uuid, metric: &str) -> Option<WindowBounds> {
        if self.samples < 2 {
            return None;
        }
        let sample = |value, ts| TelemetrySample {
            device_id,
            metric: metric.to_string(),
            value,
            ts,
        };
        Some(WindowBounds {
            first: sample(self.first_value, self.first_ts),
            last: sample(self.last_value, self.last_ts),
        })
    }
}

// ── Schedules ───────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ScheduleRow {
    pub site_id: Uuid,
    pub kind: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub weekdays: Option<Vec<i16>>,
    pub utc_offset_minutes: i32,
}

impl TryFrom<ScheduleRow> for ScheduleWindow {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            site_id: row.site_id,
            kind: row.kind.parse().map_err(StoreError::Decode)?,
            start: row.start_time,
            end: row.end_time,
            weekdays: weekdays_from_iso(row.weekdays.as_deref().unwrap_or_default()),
            utc_offset_minutes: row.utc_offset_minutes,
        })
    }
}

// ── Alerts ──────────────────────────────────────────────────────────

/// Column list matching [`AlertRow`].
pub(crate) const ALERT_COLUMNS: &str = "id, site_id, device_id, rule_id, type AS alert_type, \
     severity, message, status, first_seen_at, last_seen_at, acknowledged_by, \
     acknowledged_at, muted_until";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AlertRow {
    pub id: Uuid,
    pub site_id: Option<Uuid>,
    pub device_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub muted_until: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let severity = row
            .severity
            .parse()
            .map_err(|e| StoreError::Decode(format!("alert {}: {e}", row.id)))?;
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Decode(format!("alert {}: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            site_id: row.site_id,
            device_id: row.device_id,
            rule_id: row.rule_id,
            alert_type: row.alert_type,
            severity,
            message: row.message,
            status,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: row.acknowledged_at,
            muted_until: row.muted_until,
        })
    }
}
