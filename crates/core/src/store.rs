//! Collaborator contracts the evaluation engine reads from and writes to.
//!
//! Every call is an independent atomic operation; nothing here spans a
//! transaction across a whole evaluation cycle. Timeouts, if any, belong to
//! the implementation and surface as ordinary [`StoreError`]s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::alert::{ActiveAlertCounts, Alert, AlertKey, UpsertAlert, UpsertOutcome};
use crate::device::{DeviceSnapshot, TelemetrySample, WindowBounds};
use crate::error::StoreError;
use crate::rule::AlertRuleRecord;
use crate::schedule::ScheduleContext;

/// Key under which the engine publishes its cycle summary.
pub const ENGINE_STATUS_KEY: &str = "alerts_engine";

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Every enabled rule across all organisations. Order is insignificant.
    async fn get_all_enabled_rules(&self) -> Result<Vec<AlertRuleRecord>, StoreError>;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn get_device_last_seen(&self) -> Result<Vec<DeviceSnapshot>, StoreError>;

    /// Latest sample per requested (device, metric). A pair without a row is
    /// simply absent from the result.
    async fn get_latest_telemetry_for_metrics(
        &self,
        device_ids: &[Uuid],
        metrics: &[String],
    ) -> Result<Vec<TelemetrySample>, StoreError>;

    /// Earliest and latest samples within `[now - window_sec, now]`, or
    /// `None` when the window holds fewer than two samples.
    async fn get_telemetry_window_bounds(
        &self,
        device_id: Uuid,
        metric: &str,
        window_sec: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowBounds>, StoreError>;
}

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    async fn get_schedule_context_for_site(
        &self,
        site_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduleContext, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Refresh the active alert matching `input.key()` (severity, message and
    /// `last_seen_at` only) or open a new one.
    async fn upsert_active_alert(&self, input: UpsertAlert) -> Result<UpsertOutcome, StoreError>;

    /// Move the matching active alert to cleared. Returns `false` when there
    /// was nothing to clear.
    async fn clear_alert_if_exists(
        &self,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError>;

    async fn mute_alert(
        &self,
        alert_id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Alert, StoreError>;

    async fn get_active_alert_counts_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<ActiveAlertCounts, StoreError>;
}

/// Liveness and metrics sink read by external health checks.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn upsert_status(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError>;

    async fn mark_heartbeat(&self, now: DateTime<Utc>) -> Result<(), StoreError>;
}
