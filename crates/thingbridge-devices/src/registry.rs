/*!
 * Device registry.
 *
 * The registry tracks discovered devices keyed by UDN. It is a pure
 * data structure: the control point is its only owner, performs every
 * mutation, and emits the corresponding notifications, so registry
 * state and event fan-out can never disagree.
 */
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thingbridge_core::types::Id;

use crate::device::DeviceRecord;

/// UDN-keyed map of discovered devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<Id, Arc<DeviceRecord>>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of a device.
    ///
    /// At most one record exists per UDN: observing a known UDN
    /// refreshes its last-seen timestamp and returns `false`; only a
    /// newly observed UDN inserts and returns `true`.
    pub fn observe(&mut self, record: Arc<DeviceRecord>) -> bool {
        if let Some(existing) = self.devices.get(record.udn()) {
            existing.mark_seen();
            return false;
        }

        self.devices.insert(record.udn().clone(), record);
        true
    }

    /// Remove a device by UDN, returning its record if it was present
    pub fn remove(&mut self, udn: &Id) -> Option<Arc<DeviceRecord>> {
        self.devices.remove(udn)
    }

    /// Remove and return exactly the devices unseen for longer than `max_age`
    pub fn scrub(&mut self, max_age: Duration) -> Vec<Arc<DeviceRecord>> {
        let stale: Vec<Id> = self
            .devices
            .values()
            .filter(|record| record.age() > max_age)
            .map(|record| record.udn().clone())
            .collect();

        stale
            .iter()
            .filter_map(|udn| self.devices.remove(udn))
            .collect()
    }

    /// Get a device record by UDN
    pub fn get(&self, udn: &Id) -> Option<Arc<DeviceRecord>> {
        self.devices.get(udn).cloned()
    }

    /// Check whether a device is present
    pub fn contains(&self, udn: &Id) -> bool {
        self.devices.contains_key(udn)
    }

    /// All tracked device records
    pub fn records(&self) -> Vec<Arc<DeviceRecord>> {
        self.devices.values().cloned().collect()
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::sim::SimEndpoint;
    use thingbridge_core::types::Metadata;

    fn record(udn: &str) -> Arc<DeviceRecord> {
        Arc::new(DeviceRecord::new(
            Id::from(udn),
            "urn:Sample:1".to_string(),
            vec![SimEndpoint::new("urn:Sample:Switch")],
            Metadata::new(),
        ))
    }

    #[tokio::test]
    async fn test_observe_inserts_once_per_udn() {
        let mut registry = DeviceRegistry::new();

        assert!(registry.observe(record("uuid:1")));
        assert!(!registry.observe(record("uuid:1")));
        assert_eq!(registry.len(), 1);

        assert!(registry.observe(record("uuid:2")));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_refreshes_last_seen() {
        let mut registry = DeviceRegistry::new();
        let original = record("uuid:1");
        registry.observe(original.clone());

        tokio::time::advance(Duration::from_secs(45)).await;
        registry.observe(record("uuid:1"));

        // The original record was kept and refreshed, not replaced
        let tracked = registry.get(&Id::from("uuid:1")).unwrap();
        assert!(Arc::ptr_eq(&tracked, &original));
        assert_eq!(tracked.age(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrub_removes_exactly_the_stale() {
        let mut registry = DeviceRegistry::new();
        registry.observe(record("uuid:old"));

        tokio::time::advance(Duration::from_secs(70)).await;
        registry.observe(record("uuid:fresh"));

        let removed = registry.scrub(Duration::from_secs(60));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].udn().as_str(), "uuid:old");

        assert!(!registry.contains(&Id::from("uuid:old")));
        assert!(registry.contains(&Id::from("uuid:fresh")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrub_threshold_is_strict() {
        let mut registry = DeviceRegistry::new();
        registry.observe(record("uuid:1"));

        tokio::time::advance(Duration::from_secs(60)).await;
        // Exactly max-age old is not "older than"
        assert!(registry.scrub(Duration::from_secs(60)).is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.scrub(Duration::from_secs(60)).len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let mut registry = DeviceRegistry::new();
        registry.observe(record("uuid:1"));

        assert!(registry.remove(&Id::from("uuid:1")).is_some());
        assert!(registry.remove(&Id::from("uuid:1")).is_none());
        assert!(registry.is_empty());
    }
}
