use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heatwatch_core::{
    mute_deadline, window_start, ActiveAlertCounts, Alert, AlertKey, AlertRuleRecord, AlertStore,
    DeviceSnapshot, RuleStore, ScheduleContext, ScheduleProvider, ScheduleWindow, Severity,
    StatusSink, StoreError, TelemetrySample, TelemetryStore, UpsertAlert, UpsertOutcome,
    WindowBounds, ENGINE_STATUS_KEY,
};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::db_error;
use crate::rows::{
    AlertRow, DeviceRow, RuleRow, ScheduleRow, TelemetryRow, WindowRow, ALERT_COLUMNS,
};

/// Matches the single active alert for `(device_id, type)`.
/// Binds: device_id, type.
const ACTIVE_ALERT_BY_KEY: &str = "SELECT id FROM alerts
     WHERE device_id = $1
       AND type = $2
       AND status = 'active'
     ORDER BY first_seen_at DESC
     LIMIT 1";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[async_trait]
impl RuleStore for PgStore {
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, org_id, site_id, device_id, metric, rule_type, threshold,
                    roc_window_sec::bigint AS roc_window_sec,
                    offline_grace_sec::bigint AS offline_grace_sec,
                    enabled, severity,
                    snooze_default_sec::bigint AS snooze_default_sec,
                    name, description
             FROM alert_rules
             WHERE enabled = true",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(AlertRuleRecord::from).collect())
    }
}

// ── Devices & telemetry ─────────────────────────────────────────────

#[async_trait]
impl TelemetryStore for PgStore {
    async fn get_device_last_seen(&self) -> Result<Vec<DeviceSnapshot>, StoreError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, org_id, site_id, last_seen_at, muted_until, data
             FROM devices",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(DeviceSnapshot::from).collect())
    }

    async fn get_latest_telemetry_for_metrics(
        &self,
        device_ids: &[Uuid],
        metrics: &[String],
    ) -> Result<Vec<TelemetrySample>, StoreError> {
        if device_ids.is_empty() || metrics.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, TelemetryRow>(
            "SELECT DISTINCT ON (device_id, metric)
                    device_id, metric, value::double precision AS value, ts
             FROM telemetry
             WHERE device_id = ANY($1)
               AND metric = ANY($2)
             ORDER BY device_id, metric, ts DESC",
        )
        .bind(device_ids)
        .bind(metrics)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(TelemetrySample::from).collect())
    }

    async fn get_telemetry_window_bounds(
        &self,
        device_id: Uuid,
        metric: &str,
        window_sec: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowBounds>, StoreError> {
        let since = window_start(now, window_sec)?;

        let row = sqlx::query_as::<_, WindowRow>(
            "WITH w AS (
                 SELECT value::double precision AS value, ts
                 FROM telemetry
                 WHERE device_id = $1 AND metric = $2 AND ts >= $3 AND ts <= $4
             )
             SELECT (SELECT count(*) FROM w) AS samples,
                    f.value AS first_value, f.ts AS first_ts,
                    l.value AS last_value, l.ts AS last_ts
             FROM (SELECT value, ts FROM w ORDER BY ts ASC LIMIT 1) f,
                  (SELECT value, ts FROM w ORDER BY ts DESC LIMIT 1) l",
        )
        .bind(device_id)
        .bind(metric)
        .bind(since)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.and_then(|r| r.into_bounds(device_id, metric)))
    }
}

// ── Schedules ───────────────────────────────────────────────────────

#[async_trait]
impl ScheduleProvider for PgStore {
    async fn get_schedule_context_for_site(
        &self,
        site_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduleContext, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT s.site_id, s.kind, s.start_time, s.end_time, s.weekdays,
                    COALESCE(st.utc_offset_minutes, 0)::int AS utc_offset_minutes
             FROM site_schedules s
             JOIN sites st ON st.id = s.site_id
             WHERE s.site_id = $1",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in rows {
            match ScheduleWindow::try_from(row) {
                Ok(window) => windows.push(window),
                Err(e) => warn!(site_id = %site_id, error = %e, "ignoring schedule row"),
            }
        }
        Ok(ScheduleContext::evaluate(&windows, now))
    }
}

// ── Alerts ──────────────────────────────────────────────────────────

#[async_trait]
impl AlertStore for PgStore {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = 'active'"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn upsert_active_alert(&self, input: UpsertAlert) -> Result<UpsertOutcome, StoreError> {
        let refreshed = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts
             SET severity = $3, message = $4, last_seen_at = $5
             WHERE id = ({ACTIVE_ALERT_BY_KEY})
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(input.device_id)
        .bind(&input.alert_type)
        .bind(input.severity.as_str())
        .bind(&input.message)
        .bind(input.now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some(row) = refreshed {
            return Ok(UpsertOutcome {
                alert: Alert::try_from(row)?,
                is_new: false,
            });
        }

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "INSERT INTO alerts
                 (id, site_id, device_id, rule_id, type, severity, message, status,
                  first_seen_at, last_seen_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $8)
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.site_id)
        .bind(input.device_id)
        .bind(input.rule_id)
        .bind(&input.alert_type)
        .bind(input.severity.as_str())
        .bind(&input.message)
        .bind(input.now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(UpsertOutcome {
            alert: Alert::try_from(row)?,
            is_new: true,
        })
    }

    async fn clear_alert_if_exists(
        &self,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE alerts
             SET status = 'cleared', last_seen_at = $3
             WHERE id = ({ACTIVE_ALERT_BY_KEY})"
        ))
        .bind(key.device_id)
        .bind(&key.alert_type)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts
             SET acknowledged_by = $2, acknowledged_at = $3
             WHERE id = $1
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::AlertNotFound(alert_id))?;

        Alert::try_from(row)
    }

    async fn mute_alert(
        &self,
        alert_id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let until = mute_deadline(now, minutes)?;
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts
             SET muted_until = $2
             WHERE id = $1
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .bind(until)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::AlertNotFound(alert_id))?;

        Alert::try_from(row)
    }

    async fn get_active_alert_counts_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<ActiveAlertCounts, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT a.severity, count(*)
             FROM alerts a
             JOIN devices d ON d.id = a.device_id
             WHERE d.org_id = $1 AND a.status = 'active'
             GROUP BY a.severity",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut counts = ActiveAlertCounts::default();
        for (severity, n) in rows {
            let n = n.max(0) as u64;
            match severity.parse::<Severity>() {
                Ok(Severity::Warning) => counts.warning += n,
                Ok(Severity::Critical) => counts.critical += n,
                Err(e) => {
                    warn!(org_id = %org_id, error = %e, "active alerts with unknown severity");
                    continue;
                }
            }
            counts.total += n;
        }
        Ok(counts)
    }
}

// ── Status ──────────────────────────────────────────────────────────

#[async_trait]
impl StatusSink for PgStore {
    async fn upsert_status(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_status (key, payload, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE
             SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn mark_heartbeat(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO heartbeats (source, beat_at)
             VALUES ($1, $2)
             ON CONFLICT (source) DO UPDATE SET beat_at = EXCLUDED.beat_at",
        )
        .bind(ENGINE_STATUS_KEY)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
