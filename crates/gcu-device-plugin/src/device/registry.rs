use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde::Serialize;

/// Health state of a device as reported to the kubelet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl Health {
    pub fn from_healthy(healthy: bool) -> Self {
        if healthy {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }

    /// Wire value understood by the kubelet device manager.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => device_plugin_pb::HEALTHY,
            Self::Unhealthy => device_plugin_pb::UNHEALTHY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Node-local index rendered as text.
    pub id: String,
    pub health: Health,
}

impl Device {
    pub fn new(id: impl Into<String>, health: Health) -> Self {
        Self {
            id: id.into(),
            health,
        }
    }
}

/// Devices keyed by id. Iteration order is the key order, so a given set
/// always serializes the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSet {
    devices: BTreeMap<String, Device>,
}

/// Point-in-time view handed to readers.
pub type Snapshot = Arc<DeviceSet>;

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.iter().filter(|d| d.health == Health::Healthy).count()
    }

    /// Comma separated ids, for logs.
    pub fn ids(&self) -> String {
        self.devices.keys().cloned().collect::<Vec<_>>().join(",")
    }

    /// What changed going from `previous` to `self`.
    pub fn diff(&self, previous: &DeviceSet) -> InventoryDiff {
        let mut diff = InventoryDiff::default();
        for device in self.iter() {
            match previous.get(&device.id) {
                None => diff.added.push(device.id.clone()),
                Some(old) if old.health != device.health => {
                    diff.health_changed.push(device.id.clone())
                }
                Some(_) => {}
            }
        }
        diff.removed = previous
            .iter()
            .filter(|d| !self.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();
        diff
    }
}

impl FromIterator<Device> for DeviceSet {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut set = Self::new();
        for device in iter {
            set.insert(device);
        }
        set
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub health_changed: Vec<String>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.health_changed.is_empty()
    }
}

/// Authoritative device inventory.
///
/// The monitor is the only writer. Updates swap the whole set, so a reader
/// holding a [`Snapshot`] never sees a mix of old and new entries.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    current: RwLock<Snapshot>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held set and report whether membership or any health
    /// value changed.
    pub fn update(&self, next: DeviceSet) -> bool {
        let next = Arc::new(next);
        let previous = {
            let mut current = self.current.write().expect("poisoned");
            std::mem::replace(&mut *current, Arc::clone(&next))
        };

        let diff = next.diff(&previous);
        if diff.is_empty() {
            return false;
        }
        tracing::info!(
            added = ?diff.added,
            removed = ?diff.removed,
            health_changed = ?diff.health_changed,
            "device inventory changed, {} of {} devices healthy",
            next.healthy_count(),
            next.len()
        );
        true
    }

    pub fn exists(&self, id: &str) -> bool {
        self.current.read().expect("poisoned").contains(id)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.current.read().expect("poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn set(devices: &[(&str, Health)]) -> DeviceSet {
        devices
            .iter()
            .map(|(id, health)| Device::new(*id, *health))
            .collect()
    }

    #[test]
    fn first_update_from_empty_is_a_change() {
        let registry = DeviceRegistry::new();
        assert!(registry.snapshot().is_empty());
        assert!(registry.update(set(&[("0", Health::Healthy)])));
        assert!(registry.exists("0"));
        assert!(!registry.exists("1"));
    }

    #[test]
    fn identical_update_is_not_a_change() {
        let registry = DeviceRegistry::new();
        let devices = [("0", Health::Healthy), ("1", Health::Unhealthy)];
        assert!(registry.update(set(&devices)));
        assert!(!registry.update(set(&devices)));
        assert!(!registry.update(set(&devices)));
    }

    #[test]
    fn health_flip_is_a_change() {
        let registry = DeviceRegistry::new();
        registry.update(set(&[("0", Health::Healthy), ("1", Health::Unhealthy)]));
        assert!(registry.update(set(&[("0", Health::Healthy), ("1", Health::Healthy)])));
        assert_eq!(
            registry.snapshot().get("1").map(|d| d.health),
            Some(Health::Healthy)
        );
    }

    #[test]
    fn removal_is_a_change_and_drops_the_device() {
        let registry = DeviceRegistry::new();
        registry.update(set(&[("0", Health::Healthy), ("1", Health::Healthy)]));
        assert!(registry.update(set(&[("0", Health::Healthy)])));
        assert!(!registry.exists("1"));
    }

    #[test]
    fn empty_update_after_devices_is_a_change() {
        let registry = DeviceRegistry::new();
        registry.update(set(&[("0", Health::Healthy)]));
        assert!(registry.update(DeviceSet::new()));
        assert!(registry.snapshot().is_empty());
        assert!(!registry.update(DeviceSet::new()));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let registry = DeviceRegistry::new();
        registry.update(set(&[("0", Health::Healthy)]));
        let before = registry.snapshot();

        registry.update(set(&[("0", Health::Unhealthy), ("1", Health::Healthy)]));

        assert_eq!(before.len(), 1);
        assert_eq!(before.get("0").map(|d| d.health), Some(Health::Healthy));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn snapshot_order_is_by_id() {
        let devices = set(&[
            ("2", Health::Healthy),
            ("0", Health::Unhealthy),
            ("1", Health::Healthy),
        ]);
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
        assert_eq!(devices.ids(), "0,1,2");
        assert_eq!(devices.healthy_count(), 2);
    }

    #[test]
    fn diff_reports_each_kind_of_change() {
        let previous = set(&[("0", Health::Healthy), ("1", Health::Healthy)]);
        let next = set(&[("1", Health::Unhealthy), ("2", Health::Healthy)]);
        assert_eq!(
            next.diff(&previous),
            InventoryDiff {
                added: vec!["2".to_string()],
                removed: vec!["0".to_string()],
                health_changed: vec!["1".to_string()],
            }
        );
    }

    #[test]
    fn health_wire_values() {
        assert_eq!(Health::from_healthy(true).as_str(), "Healthy");
        assert_eq!(Health::from_healthy(false).as_str(), "Unhealthy");
    }
}
