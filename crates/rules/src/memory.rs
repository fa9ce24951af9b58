//! In-process implementation of every store contract.
//!
//! Holds rules, devices, telemetry, schedules and alerts in memory behind a
//! single lock. Used by the test suite and for running the engine without a
//! database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heatwatch_core::{
    mute_deadline, window_start, ActiveAlertCounts, Alert, AlertKey, AlertRuleRecord, AlertStatus,
    AlertStore, DeviceSnapshot, RuleStore, ScheduleContext, ScheduleProvider, ScheduleWindow,
    StatusSink, StoreError, TelemetrySample, TelemetryStore, UpsertAlert, UpsertOutcome,
    WindowBounds,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<AlertRuleRecord>,
    devices: Vec<DeviceSnapshot>,
    telemetry: Vec<TelemetrySample>,
    schedules: HashMap<Uuid, Vec<ScheduleWindow>>,
    alerts: Vec<Alert>,
    status: HashMap<String, serde_json::Value>,
    heartbeats: Vec<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ─────────────────────────────────────────────────────

    pub async fn insert_rule(&self, rule: AlertRuleRecord) {
        let mut inner = self.inner.write().await;
        inner.rules.retain(|r| r.id != rule.id);
        inner.rules.push(rule);
    }

    pub async fn upsert_device(&self, device: DeviceSnapshot) {
        let mut inner = self.inner.write().await;
        match inner.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => inner.devices.push(device),
        }
    }

    pub async fn push_telemetry(&self, sample: TelemetrySample) {
        self.inner.write().await.telemetry.push(sample);
    }

    pub async fn add_schedule(&self, window: ScheduleWindow) {
        self.inner
            .write()
            .await
            .schedules
            .entry(window.site_id)
            .or_default()
            .push(window);
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Every alert row ever written, cleared ones included.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.clone()
    }

    pub async fn status(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().await.status.get(key).cloned()
    }

    pub async fn heartbeats(&self) -> Vec<DateTime<Utc>> {
        self.inner.read().await.heartbeats.clone()
    }
}

fn org_of(devices: &[DeviceSnapshot], device_id: Uuid) -> Option<Uuid> {
    devices.iter().find(|d| d.id == device_id).map(|d| d.org_id)
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .rules
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn get_device_last_seen(&self) -> Result<Vec<DeviceSnapshot>, StoreError> {
        Ok(self.inner.read().await.devices.clone())
    }

    async fn get_latest_telemetry_for_metrics(
        &self,
        device_ids: &[Uuid],
        metrics: &[String],
    ) -> Result<Vec<TelemetrySample>, StoreError> {
        let inner = self.inner.read().await;
        let mut latest: HashMap<(Uuid, &str), &TelemetrySample> = HashMap::new();

        for sample in &inner.telemetry {
            if !device_ids.contains(&sample.device_id) || !metrics.contains(&sample.metric) {
                continue;
            }
            let key = (sample.device_id, sample.metric.as_str());
            match latest.get(&key) {
                Some(existing) if existing.ts >= sample.ts => {}
                _ => {
                    latest.insert(key, sample);
                }
            }
        }

        Ok(latest.into_values().cloned().collect())
    }

    async fn get_telemetry_window_bounds(
        &self,
        device_id: Uuid,
        metric: &str,
        window_sec: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowBounds>, StoreError> {
        let since = window_start(now, window_sec)?;
        let inner = self.inner.read().await;

        let mut in_window: Vec<&TelemetrySample> = inner
            .telemetry
            .iter()
            .filter(|s| s.device_id == device_id && s.metric == metric)
            .filter(|s| s.ts >= since && s.ts <= now)
            .collect();
        if in_window.len() < 2 {
            return Ok(None);
        }
        in_window.sort_by_key(|s| s.ts);

        Ok(Some(WindowBounds {
            first: in_window[0].clone(),
            last: in_window[in_window.len() - 1].clone(),
        }))
    }
}

#[async_trait]
impl ScheduleProvider for MemoryStore {
    async fn get_schedule_context_for_site(
        &self,
        site_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduleContext, StoreError> {
        let inner = self.inner.read().await;
        let windows = inner
            .schedules
            .get(&site_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(ScheduleContext::evaluate(windows, now))
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn upsert_active_alert(&self, input: UpsertAlert) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let key = input.key();

        if let Some(existing) = inner
            .alerts
            .iter_mut()
            .find(|a| a.is_active() && key.matches(a))
        {
            existing.severity = input.severity;
            existing.message = input.message;
            existing.last_seen_at = input.now;
            return Ok(UpsertOutcome {
                alert: existing.clone(),
                is_new: false,
            });
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            site_id: input.site_id,
            device_id: input.device_id,
            rule_id: input.rule_id,
            alert_type: input.alert_type,
            severity: input.severity,
            message: input.message,
            status: AlertStatus::Active,
            first_seen_at: input.now,
            last_seen_at: input.now,
            acknowledged_by: None,
            acknowledged_at: None,
            muted_until: None,
        };
        inner.alerts.push(alert.clone());
        Ok(UpsertOutcome {
            alert,
            is_new: true,
        })
    }

    async fn clear_alert_if_exists(
        &self,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner
            .alerts
            .iter_mut()
            .find(|a| a.is_active() && key.matches(a))
        {
            Some(alert) => {
                alert.status = AlertStatus::Cleared;
                alert.last_seen_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or(StoreError::AlertNotFound(alert_id))?;
        alert.acknowledged_by = Some(user_id);
        alert.acknowledged_at = Some(now);
        Ok(alert.clone())
    }

    async fn mute_alert(
        &self,
        alert_id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let until = mute_deadline(now, minutes)?;
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or(StoreError::AlertNotFound(alert_id))?;
        alert.muted_until = Some(until);
        Ok(alert.clone())
    }

    async fn get_active_alert_counts_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<ActiveAlertCounts, StoreError> {
        let inner = self.inner.read().await;
        let mut counts = ActiveAlertCounts::default();
        for alert in inner.alerts.iter().filter(|a| a.is_active()) {
            if org_of(&inner.devices, alert.device_id) == Some(org_id) {
                counts.record(alert.severity);
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl StatusSink for MemoryStore {
    async fn upsert_status(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .status
            .insert(key.to_string(), payload);
        Ok(())
    }

    async fn mark_heartbeat(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.write().await.heartbeats.push(now);
        Ok(())
    }
}
