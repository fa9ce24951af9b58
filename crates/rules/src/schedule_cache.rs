//! Per-cycle memoization of site schedule contexts.
//!
//! Many devices share a site, so each site is looked up at most once per
//! evaluation cycle. The cache is built fresh for every cycle and dropped at
//! its end; it never outlives the `now` it was created with.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use heatwatch_core::{ScheduleContext, ScheduleProvider, StoreError};
use uuid::Uuid;

pub struct ScheduleCache<'a> {
    provider: &'a dyn ScheduleProvider,
    now: DateTime<Utc>,
    entries: HashMap<Uuid, ScheduleContext>,
}

impl<'a> ScheduleCache<'a> {
    pub fn new(provider: &'a dyn ScheduleProvider, now: DateTime<Utc>) -> Self {
        Self {
            provider,
            now,
            entries: HashMap::new(),
        }
    }

    /// Context for a site, fetching it on first use. Devices without a site
    /// get the default (no load shedding, no peak).
    pub async fn get(&mut self, site_id: Option<Uuid>) -> Result<ScheduleContext, StoreError> {
        let Some(site_id) = site_id else {
            return Ok(ScheduleContext::default());
        };

        if let Some(ctx) = self.entries.get(&site_id) {
            return Ok(*ctx);
        }

        let ctx = self
            .provider
            .get_schedule_context_for_site(site_id, self.now)
            .await?;
        tracing::debug!(
            site_id = %site_id,
            load_shedding = ctx.is_load_shedding,
            tou_peak = ctx.is_tou_peak,
            "schedule context resolved"
        );
        self.entries.insert(site_id, ctx);
        Ok(ctx)
    }

    /// Cached context, or the default for sites never fetched.
    pub fn cached(&self, site_id: Option<Uuid>) -> ScheduleContext {
        site_id
            .and_then(|id| self.entries.get(&id).copied())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
