//! Metric value resolution across storage shapes.
//!
//! Newer devices report into the structured telemetry table; older firmware
//! only leaves the last raw payload on the device row. The evaluator asks a
//! [`MetricResolver`] for a value and does not care which backend answered.
//! Backends are tried in order and the first one holding a value wins.

use std::collections::HashMap;

use heatwatch_core::{DeviceSnapshot, TelemetrySample};
use uuid::Uuid;

/// One way of looking up the latest value of a metric for a device.
pub trait MetricSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn latest_value(&self, device: &DeviceSnapshot, metric: &str) -> Option<f64>;
}

/// A value together with the backend it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedValue {
    pub value: f64,
    pub source: &'static str,
}

// ── Structured telemetry ────────────────────────────────────────────

/// Latest samples batch-fetched from the telemetry table for this cycle.
#[derive(Debug, Default)]
pub struct TelemetryMetrics {
    latest: HashMap<(Uuid, String), TelemetrySample>,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples, keeping the newest per (device, metric).
    pub fn extend(&mut self, samples: impl IntoIterator<Item = TelemetrySample>) {
        for sample in samples {
            let key = (sample.device_id, sample.metric.clone());
            match self.latest.get(&key) {
                Some(existing) if existing.ts >= sample.ts => {}
                _ => {
                    self.latest.insert(key, sample);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl MetricSource for TelemetryMetrics {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn latest_value(&self, device: &DeviceSnapshot, metric: &str) -> Option<f64> {
        self.latest
            .get(&(device.id, metric.to_string()))
            .map(|s| s.value)
    }
}

// ── Legacy raw payload ──────────────────────────────────────────────

/// Reads metrics out of the device's raw `data` blob.
///
/// Accepts `data[metric]`, `data[camelCase(metric)]` and
/// `data.metrics[metric]`, as a JSON number or a numeric string.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotMetrics;

impl MetricSource for SnapshotMetrics {
    fn name(&self) -> &'static str {
        "device_data"
    }

    fn latest_value(&self, device: &DeviceSnapshot, metric: &str) -> Option<f64> {
        let data = device.data.as_object()?;
        let camel = snake_to_camel(metric);

        data.get(metric)
            .or_else(|| data.get(&camel))
            .or_else(|| data.get("metrics").and_then(|m| m.get(metric)))
            .and_then(json_number)
    }
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ── Resolver ────────────────────────────────────────────────────────

pub struct MetricResolver<'a> {
    sources: Vec<&'a dyn MetricSource>,
}

impl<'a> MetricResolver<'a> {
    pub fn new(sources: Vec<&'a dyn MetricSource>) -> Self {
        Self { sources }
    }

    pub fn resolve(&self, device: &DeviceSnapshot, metric: &str) -> Option<ResolvedValue> {
        self.sources.iter().find_map(|source| {
            source
                .latest_value(device, metric)
                .map(|value| ResolvedValue {
                    value,
                    source: source.name(),
                })
        })
    }
}
