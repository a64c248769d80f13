/*!
 * Simulated transport for thingbridge.
 *
 * An in-memory transport implementing the discovery and endpoint
 * contracts: devices are registered by hand, searches re-announce
 * whatever is registered, and endpoints record every call and emit
 * events on demand. Used by the engine's own tests and by downstream
 * integration code that needs device churn without a network.
 */
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use thingbridge_core::types::{Id, Metadata, Value, ValueMap};

use crate::endpoint::{EndpointFailure, ServiceEndpoint};
use crate::error::{BridgeError, Result};
use crate::transport::{Announcement, DeviceAnnouncement, DiscoveryTransport};

const CHANNEL_CAPACITY: usize = 64;

/// A scriptable service endpoint.
///
/// Subscribe results can be failed on demand, every action invocation
/// is recorded, and both notification channels can be driven from the
/// test side.
#[derive(Debug)]
pub struct SimEndpoint {
    service_type: String,
    subscribe_error: Mutex<Option<String>>,
    subscribe_count: AtomicUsize,
    failing_actions: Mutex<Vec<String>>,
    invocations: Mutex<Vec<(String, ValueMap)>>,
    failures: broadcast::Sender<EndpointFailure>,
    state_changes: broadcast::Sender<ValueMap>,
}

impl SimEndpoint {
    /// Create an endpoint for a service-type URN
    pub fn new<S: Into<String>>(service_type: S) -> Arc<Self> {
        let (failures, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (state_changes, _) = broadcast::channel(CHANNEL_CAPACITY);

        Arc::new(Self {
            service_type: service_type.into(),
            subscribe_error: Mutex::new(None),
            subscribe_count: AtomicUsize::new(0),
            failing_actions: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
            failures,
            state_changes,
        })
    }

    /// Make the next subscribe call report the given error
    pub fn fail_next_subscribe<S: Into<String>>(&self, message: S) {
        let mut error = self
            .subscribe_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *error = Some(message.into());
    }

    /// Make invocations of the given action fail (they are still recorded)
    pub fn fail_action<S: Into<String>>(&self, action_id: S) {
        self.failing_actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action_id.into());
    }

    /// Number of subscribe calls received
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// Every action invocation received, in order
    pub fn invocations(&self) -> Vec<(String, ValueMap)> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Emit a state-change notification
    pub fn emit_state_change(&self, values: ValueMap) {
        let _ = self.state_changes.send(values);
    }

    /// Emit a failure notification
    pub fn emit_failure<S: Into<String>>(&self, code: i32, message: S) {
        let _ = self.failures.send(EndpointFailure::new(code, message));
    }
}

#[async_trait]
impl ServiceEndpoint for SimEndpoint {
    fn service_type(&self) -> &str {
        &self.service_type
    }

    async fn subscribe(&self) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .subscribe_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match scripted {
            Some(message) => Err(BridgeError::subscription(message)),
            None => Ok(()),
        }
    }

    async fn invoke_action(&self, action_id: &str, args: &ValueMap) -> Result<ValueMap> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((action_id.to_string(), args.clone()));

        let failing = self
            .failing_actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&action_id.to_string());
        if failing {
            return Err(BridgeError::action(format!("{} rejected", action_id)));
        }

        Ok(ValueMap::new())
    }

    fn failures(&self) -> broadcast::Receiver<EndpointFailure> {
        self.failures.subscribe()
    }

    fn state_changes(&self) -> broadcast::Receiver<ValueMap> {
        self.state_changes.subscribe()
    }
}

/// A simulated device assembled from endpoints and metadata
#[derive(Debug, Clone)]
pub struct SimDevice {
    udn: Id,
    device_type: String,
    metadata: Metadata,
    endpoints: Vec<Arc<SimEndpoint>>,
}

impl SimDevice {
    /// Create a device with no services or metadata
    pub fn new<U: Into<Id>, S: Into<String>>(udn: U, device_type: S) -> Self {
        Self {
            udn: udn.into(),
            device_type: device_type.into(),
            metadata: Metadata::new(),
            endpoints: Vec::new(),
        }
    }

    /// Attach a service endpoint
    pub fn with_endpoint(mut self, endpoint: Arc<SimEndpoint>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Set a raw metadata field
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The device's unique device name
    pub fn udn(&self) -> &Id {
        &self.udn
    }

    /// The announcement this device produces on discovery
    pub fn announcement(&self) -> DeviceAnnouncement {
        DeviceAnnouncement {
            udn: self.udn.clone(),
            device_type: self.device_type.clone(),
            services: self
                .endpoints
                .iter()
                .map(|endpoint| endpoint.clone() as Arc<dyn ServiceEndpoint>)
                .collect(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The simulated discovery transport
#[derive(Debug)]
pub struct SimTransport {
    announcements: broadcast::Sender<Announcement>,
    devices: Mutex<Vec<SimDevice>>,
    search_count: AtomicUsize,
}

impl SimTransport {
    /// Create a transport with no registered devices
    pub fn new() -> Arc<Self> {
        let (announcements, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            announcements,
            devices: Mutex::new(Vec::new()),
            search_count: AtomicUsize::new(0),
        })
    }

    /// Register a device and announce it immediately.
    ///
    /// Registered devices answer every later search, refreshing their
    /// last-seen timestamp.
    pub fn add_device(&self, device: SimDevice) {
        let announcement = device.announcement();
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
        let _ = self.announcements.send(Announcement::Alive(announcement));
    }

    /// Announce a device once without registering it.
    ///
    /// The device never answers a search again, so it goes stale and
    /// is eventually scrubbed.
    pub fn announce_once(&self, announcement: DeviceAnnouncement) {
        let _ = self.announcements.send(Announcement::Alive(announcement));
    }

    /// Unregister a device and signal it as gone
    pub fn remove_device(&self, udn: &Id) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|device| device.udn() != udn);
        let _ = self.announcements.send(Announcement::Gone(udn.clone()));
    }

    /// Number of search broadcasts received
    pub fn search_count(&self) -> usize {
        self.search_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryTransport for SimTransport {
    fn name(&self) -> &'static str {
        "sim"
    }

    async fn search(&self) -> Result<()> {
        self.search_count.fetch_add(1, Ordering::SeqCst);

        let announcements: Vec<DeviceAnnouncement> = {
            let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            devices.iter().map(SimDevice::announcement).collect()
        };

        debug!("sim search: {} devices answering", announcements.len());
        for announcement in announcements {
            let _ = self.announcements.send(Announcement::Alive(announcement));
        }
        Ok(())
    }

    fn announcements(&self) -> broadcast::Receiver<Announcement> {
        self.announcements.subscribe()
    }
}
