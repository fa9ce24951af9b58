//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use heatwatch_core::{
    ActiveAlertCounts, Alert, AlertKey, AlertRuleRecord, AlertStore, DeviceSnapshot, RuleStore,
    ScheduleKind, ScheduleWindow, StatusSink, StoreError, TelemetrySample, UpsertAlert,
    UpsertOutcome,
};
use heatwatch_notify::{AlertNotifier, DispatchResult};
use heatwatch_rules::{AlertEngine, Collaborators, MemoryStore};
use tokio::sync::Notify;
use uuid::Uuid;

/// Wednesday 2026-03-04 18:30 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 18, 30, 0).unwrap()
}

// ── Fleet ───────────────────────────────────────────────────────────

pub struct Fleet {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub org: Uuid,
    pub site: Uuid,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            org: Uuid::new_v4(),
            site: Uuid::new_v4(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::from_backend(self.store.clone(), self.notifier.clone())
    }

    pub fn engine(&self) -> AlertEngine {
        AlertEngine::new(self.collaborators())
    }

    /// Online device at the fleet's site.
    pub async fn device(&self) -> Uuid {
        self.device_seen(Some(now() - Duration::seconds(30))).await
    }

    pub async fn device_seen(&self, last_seen_at: Option<DateTime<Utc>>) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .upsert_device(DeviceSnapshot {
                id,
                org_id: self.org,
                site_id: Some(self.site),
                last_seen_at,
                muted_until: None,
                data: serde_json::json!({}),
            })
            .await;
        id
    }

    pub async fn reading(&self, device_id: Uuid, metric: &str, value: f64, at: DateTime<Utc>) {
        self.store
            .push_telemetry(TelemetrySample {
                device_id,
                metric: metric.to_string(),
                value,
                ts: at,
            })
            .await;
    }

    /// 18:00-20:00 UTC load shedding every day at `site_id`.
    pub async fn load_shedding(&self, site_id: Uuid) {
        self.store
            .add_schedule(ScheduleWindow {
                site_id,
                kind: ScheduleKind::LoadShedding,
                start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                weekdays: Vec::new(),
                utc_offset_minutes: 0,
            })
            .await;
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.store
            .alerts()
            .await
            .into_iter()
            .filter(|a| a.is_active())
            .collect()
    }
}

// ── Rule builders ───────────────────────────────────────────────────

pub fn rule(org_id: Uuid, rule_type: &str, severity: &str) -> AlertRuleRecord {
    AlertRuleRecord {
        id: Uuid::new_v4(),
        org_id,
        site_id: None,
        device_id: None,
        metric: "supply_temp".to_string(),
        rule_type: rule_type.to_string(),
        threshold: None,
        roc_window_sec: None,
        offline_grace_sec: None,
        enabled: true,
        severity: severity.to_string(),
        snooze_default_sec: None,
        name: "Supply temp".to_string(),
        description: None,
    }
}

pub fn threshold_above(org_id: Uuid, threshold: f64, severity: &str) -> AlertRuleRecord {
    AlertRuleRecord {
        threshold: Some(threshold),
        ..rule(org_id, "threshold_above", severity)
    }
}

pub fn threshold_below(org_id: Uuid, threshold: f64, severity: &str) -> AlertRuleRecord {
    AlertRuleRecord {
        threshold: Some(threshold),
        ..rule(org_id, "threshold_below", severity)
    }
}

pub fn rate_of_change(org_id: Uuid, threshold: f64, window_sec: i64) -> AlertRuleRecord {
    AlertRuleRecord {
        threshold: Some(threshold),
        roc_window_sec: Some(window_sec),
        ..rule(org_id, "rate_of_change", "warning")
    }
}

pub fn offline(org_id: Uuid, grace_sec: i64, severity: &str) -> AlertRuleRecord {
    AlertRuleRecord {
        offline_grace_sec: Some(grace_sec),
        ..rule(org_id, "offline_window", severity)
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// Records every alert it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Alert>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn send_alert_notification(&self, alert: &Alert) -> Vec<DispatchResult> {
        self.sent.lock().unwrap().push(alert.clone());
        vec![DispatchResult {
            channel: "recording".to_string(),
            alert_id: alert.id.to_string(),
            success: !self.fail,
            error: self.fail.then(|| "channel down".to_string()),
            duration_ms: 0,
        }]
    }
}

// ── Fault injection ─────────────────────────────────────────────────

pub struct FailingRules;

#[async_trait]
impl RuleStore for FailingRules {
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError> {
        Err(StoreError::Database("relation \"alert_rules\" does not exist".into()))
    }
}

pub struct PanickingRules;

#[async_trait]
impl RuleStore for PanickingRules {
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError> {
        panic!("rule store exploded");
    }
}

/// Holds the rule load open until released.
#[derive(Default)]
pub struct BlockingRules {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl RuleStore for BlockingRules {
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

/// Delegates to a [`MemoryStore`] but fails every write for one device.
pub struct FlakyAlerts {
    pub inner: Arc<MemoryStore>,
    pub broken_device: Uuid,
}

#[async_trait]
impl AlertStore for FlakyAlerts {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        self.inner.list_active_alerts().await
    }

    async fn upsert_active_alert(&self, input: UpsertAlert) -> Result<UpsertOutcome, StoreError> {
        if input.device_id == self.broken_device {
            return Err(StoreError::Database("deadlock detected".into()));
        }
        self.inner.upsert_active_alert(input).await
    }

    async fn clear_alert_if_exists(
        &self,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if key.device_id == self.broken_device {
            return Err(StoreError::Database("deadlock detected".into()));
        }
        self.inner.clear_alert_if_exists(key, now).await
    }

    async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        self.inner.acknowledge_alert(alert_id, user_id, now).await
    }

    async fn mute_alert(
        &self,
        alert_id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        self.inner.mute_alert(alert_id, minutes, now).await
    }

    async fn get_active_alert_counts_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<ActiveAlertCounts, StoreError> {
        self.inner.get_active_alert_counts_for_org(org_id).await
    }
}

pub struct FailingStatus;

#[async_trait]
impl StatusSink for FailingStatus {
    async fn upsert_status(
        &self,
        _key: &str,
        _payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("pool timed out".into()))
    }

    async fn mark_heartbeat(&self, _now: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("pool timed out".into()))
    }
}
