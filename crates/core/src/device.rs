use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Last-seen view of a device, as read at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: Uuid,
    pub org_id: Uuid,
    pub site_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Device-level snooze for offline alerts.
    pub muted_until: Option<DateTime<Utc>>,
    /// Raw payload of the last report. Older firmware only populates this.
    pub data: serde_json::Value,
}

impl DeviceSnapshot {
    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    /// Whole seconds since the device last reported, if it ever did.
    pub fn offline_age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_seen_at
            .map(|seen| now.signed_duration_since(seen).num_seconds())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: Uuid,
    pub metric: String,
    pub value: f64,
    pub ts: DateTime<Utc>,
}

/// Earliest and latest samples of a metric inside a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub first: TelemetrySample,
    pub last: TelemetrySample,
}

impl WindowBounds {
    pub fn abs_delta(&self) -> f64 {
        (self.last.value - self.first.value).abs()
    }
}

/// Lower edge of the window `[now - window_sec, now]`.
pub fn window_start(now: DateTime<Utc>, window_sec: i64) -> Result<DateTime<Utc>, StoreError> {
    TimeDelta::try_seconds(window_sec)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            StoreError::InvalidInput(format!("window of {window_sec}s is out of range"))
        })
}
