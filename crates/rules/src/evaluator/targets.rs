//! Device lookup by rule scope.

use std::collections::HashMap;

use heatwatch_core::{AlertRule, DeviceSnapshot, RuleScope};
use uuid::Uuid;

/// Snapshot devices indexed by id, site and org for one cycle.
pub struct DeviceIndex<'a> {
    by_id: HashMap<Uuid, &'a DeviceSnapshot>,
    by_site: HashMap<Uuid, Vec<&'a DeviceSnapshot>>,
    by_org: HashMap<Uuid, Vec<&'a DeviceSnapshot>>,
}

impl<'a> DeviceIndex<'a> {
    pub fn new(devices: &'a [DeviceSnapshot]) -> Self {
        let mut by_id = HashMap::with_capacity(devices.len());
        let mut by_site: HashMap<Uuid, Vec<&DeviceSnapshot>> = HashMap::new();
        let mut by_org: HashMap<Uuid, Vec<&DeviceSnapshot>> = HashMap::new();

        for device in devices {
            by_id.insert(device.id, device);
            if let Some(site_id) = device.site_id {
                by_site.entry(site_id).or_default().push(device);
            }
            by_org.entry(device.org_id).or_default().push(device);
        }

        Self {
            by_id,
            by_site,
            by_org,
        }
    }

    /// Devices a rule applies to: the named device, every device at the
    /// named site, or every device in the rule's org.
    ///
    /// Site and device scopes are confined to the rule's org.
    pub fn targets(&self, rule: &AlertRule) -> Vec<&'a DeviceSnapshot> {
        let same_org = |d: &&DeviceSnapshot| d.org_id == rule.org_id;
        match rule.scope() {
            RuleScope::Device(id) => self
                .by_id
                .get(&id)
                .copied()
                .filter(same_org)
                .into_iter()
                .collect(),
            RuleScope::Site(id) => self
                .by_site
                .get(&id)
                .map(|ds| ds.iter().copied().filter(same_org).collect())
                .unwrap_or_default(),
            RuleScope::Org(id) => self.by_org.get(&id).cloned().unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatwatch_core::{RuleKind, Severity};

    fn device(org_id: Uuid, site_id: Option<Uuid>) -> DeviceSnapshot {
        DeviceSnapshot {
            id: Uuid::new_v4(),
            org_id,
            site_id,
            last_seen_at: None,
            muted_until: None,
            data: serde_json::Value::Null,
        }
    }

    fn rule(org_id: Uuid, site_id: Option<Uuid>, device_id: Option<Uuid>) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            org_id,
            site_id,
            device_id,
            metric: "supply_temp".to_string(),
            kind: RuleKind::ThresholdAbove { threshold: 55.0 },
            enabled: true,
            severity: Severity::Warning,
            snooze_default_sec: None,
            name: "r".to_string(),
            description: None,
        }
    }

    #[test]
    fn resolves_device_site_and_org_scopes() {
        let org = Uuid::new_v4();
        let other_org = Uuid::new_v4();
        let site = Uuid::new_v4();
        let devices = vec![
            device(org, Some(site)),
            device(org, Some(site)),
            device(org, None),
            device(other_org, Some(site)),
        ];
        let index = DeviceIndex::new(&devices);
        assert_eq!(index.len(), 4);

        let single = index.targets(&rule(org, Some(site), Some(devices[2].id)));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].id, devices[2].id);

        let at_site = index.targets(&rule(org, Some(site), None));
        assert_eq!(at_site.len(), 2);

        let org_wide = index.targets(&rule(org, None, None));
        assert_eq!(org_wide.len(), 3);
    }

    #[test]
    fn unknown_or_foreign_device_yields_nothing() {
        let org = Uuid::new_v4();
        let devices = vec![device(Uuid::new_v4(), None)];
        let index = DeviceIndex::new(&devices);
        assert!(index.targets(&rule(org, None, Some(Uuid::new_v4()))).is_empty());
        assert!(index.targets(&rule(org, None, Some(devices[0].id))).is_empty());
        assert!(index.targets(&rule(org, Some(Uuid::new_v4()), None)).is_empty());
    }
}
