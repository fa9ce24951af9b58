//! Site schedule windows and the per-site context derived from them.
//!
//! A site can carry recurring load-shedding slots (utility power cuts) and
//! time-of-use peak tariff windows. Both are expressed in the site's local
//! time. [`ScheduleContext::evaluate`] turns the rows for one site into the
//! flags that apply at a given instant.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    LoadShedding,
    TouPeak,
}

impl std::str::FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load_shedding" => Ok(ScheduleKind::LoadShedding),
            "tou_peak" => Ok(ScheduleKind::TouPeak),
            other => Err(format!("unknown schedule kind: {other}")),
        }
    }
}

/// A recurring daily window in site-local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub site_id: Uuid,
    pub kind: ScheduleKind,
    pub start: NaiveTime,
    /// Exclusive. An `end` before `start` wraps past midnight.
    pub end: NaiveTime,
    /// Days the window starts on. Empty means every day.
    pub weekdays: Vec<Weekday>,
    pub utc_offset_minutes: i32,
}

impl ScheduleWindow {
    /// Whether `now` falls inside this window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if self.start == self.end {
            return false;
        }

        let local = now.naive_utc() + Duration::minutes(i64::from(self.utc_offset_minutes));
        let time = local.time();
        let today = local.weekday();

        let started_on = if self.start < self.end {
            (time >= self.start && time < self.end).then_some(today)
        } else if time >= self.start {
            Some(today)
        } else if time < self.end {
            Some(today.pred())
        } else {
            None
        };

        match started_on {
            Some(day) => self.weekdays.is_empty() || self.weekdays.contains(&day),
            None => false,
        }
    }
}

/// Map ISO weekday numbers (1 = Monday … 7 = Sunday) to [`Weekday`],
/// dropping anything out of range.
pub fn weekdays_from_iso(numbers: &[i16]) -> Vec<Weekday> {
    numbers
        .iter()
        .filter_map(|n| match n {
            1 => Some(Weekday::Mon),
            2 => Some(Weekday::Tue),
            3 => Some(Weekday::Wed),
            4 => Some(Weekday::Thu),
            5 => Some(Weekday::Fri),
            6 => Some(Weekday::Sat),
            7 => Some(Weekday::Sun),
            _ => None,
        })
        .collect()
}

/// Schedule flags for one site at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleContext {
    pub is_load_shedding: bool,
    /// Computed for completeness; no alerting policy reads it yet.
    pub is_tou_peak: bool,
}

impl ScheduleContext {
    pub fn evaluate(windows: &[ScheduleWindow], now: DateTime<Utc>) -> Self {
        let active = |kind: ScheduleKind| {
            windows
                .iter()
                .any(|w| w.kind == kind && w.contains(now))
        };

        Self {
            is_load_shedding: active(ScheduleKind::LoadShedding),
            is_tou_peak: active(ScheduleKind::TouPeak),
        }
    }
}
