/*!
 * Device records.
 *
 * A `DeviceRecord` is the registry's view of a discovered device: its
 * unique device name (UDN), device type, service endpoints keyed by
 * URN, raw metadata, and a last-seen timestamp that drives staleness
 * eviction. The registry owns the record; driver instances hold
 * reference-counted handles that confer no registry ownership.
 */
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use thingbridge_core::types::{Id, Metadata, Value};

use crate::endpoint::ServiceEndpoint;
use crate::transport::DeviceAnnouncement;

/// A discovered device tracked by the registry
#[derive(Debug)]
pub struct DeviceRecord {
    /// Unique device name
    udn: Id,
    /// Device type string
    device_type: String,
    /// Service endpoints keyed by service-type URN
    services: HashMap<String, Arc<dyn ServiceEndpoint>>,
    /// Raw top-level metadata fields
    metadata: Metadata,
    /// When the device was last observed by discovery
    last_seen: RwLock<Instant>,
}

impl DeviceRecord {
    /// Create a new device record, freshly seen
    pub fn new(
        udn: Id,
        device_type: String,
        services: Vec<Arc<dyn ServiceEndpoint>>,
        metadata: Metadata,
    ) -> Self {
        let services = services
            .into_iter()
            .map(|endpoint| (endpoint.service_type().to_string(), endpoint))
            .collect();

        Self {
            udn,
            device_type,
            services,
            metadata,
            last_seen: RwLock::new(Instant::now()),
        }
    }

    /// Build a record from a transport announcement
    pub fn from_announcement(announcement: DeviceAnnouncement) -> Self {
        Self::new(
            announcement.udn,
            announcement.device_type,
            announcement.services,
            announcement.metadata,
        )
    }

    /// The unique device name
    pub fn udn(&self) -> &Id {
        &self.udn
    }

    /// The device type string
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Resolve a service endpoint by exact service-type URN match
    pub fn service(&self, service_urn: &str) -> Option<Arc<dyn ServiceEndpoint>> {
        self.services.get(service_urn).cloned()
    }

    /// The service-type URNs exposed by this device
    pub fn service_types(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// The raw top-level metadata fields
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The flat scalar view of this device: UDN, device type, and every
    /// string/number/boolean top-level metadata field. Array- and
    /// object-valued fields stay behind.
    pub fn scalar_metadata(&self) -> Metadata {
        let mut flat = Metadata::new();
        flat.insert("udn".to_string(), Value::String(self.udn.to_string()));
        flat.insert(
            "deviceType".to_string(),
            Value::String(self.device_type.clone()),
        );

        for (key, value) in &self.metadata {
            if value.is_scalar() {
                flat.insert(key.clone(), value.clone());
            }
        }

        flat
    }

    /// Refresh the last-seen timestamp to now
    pub fn mark_seen(&self) {
        let mut last_seen = self
            .last_seen
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *last_seen = Instant::now();
    }

    /// When this device was last observed
    pub fn last_seen(&self) -> Instant {
        *self
            .last_seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// How long since this device was last observed
    pub fn age(&self) -> Duration {
        self.last_seen().elapsed()
    }
}
