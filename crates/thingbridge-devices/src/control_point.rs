/*!
 * Control point.
 *
 * The control point coordinates discovery and liveness for every driver
 * instance sharing a transport: it owns the registry, pumps transport
 * announcements into it, runs the periodic search-and-scrub timer, and
 * fans out device-found / device-lost notifications. It is an explicit
 * instance owned by the embedding service and passed by reference to
 * driver factories; background tasks hold weak references and stop when
 * the owner drops it.
 */
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use thingbridge_core::config::DiscoveryConfig;
use thingbridge_core::types::Id;

use crate::device::DeviceRecord;
use crate::error::{BridgeError, Result};
use crate::registry::DeviceRegistry;
use crate::transport::{Announcement, DeviceAnnouncement, DiscoveryTransport};

/// Event types for the control point's device notifications
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device was newly observed.
    ///
    /// Emitted once per UDN; a mere last-seen refresh does not re-emit
    /// until a matching `DeviceLost` has occurred.
    DeviceFound(Arc<DeviceRecord>),
    /// A device was evicted by scrub or explicit forget
    DeviceLost(Arc<DeviceRecord>),
}

/// Shared coordinator of discovery and liveness
#[derive(Debug)]
pub struct ControlPoint {
    /// The discovery transport
    transport: Arc<dyn DiscoveryTransport>,
    /// The tracked devices; mutated only here
    registry: RwLock<DeviceRegistry>,
    /// Device notification fan-out
    events: broadcast::Sender<RegistryEvent>,
    /// Discovery and liveness settings
    config: DiscoveryConfig,
    /// Background pump and timer tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ControlPoint {
    /// Create a control point and start its background tasks.
    ///
    /// The timer issues a discovery broadcast and a scrub pass every
    /// `config.search_interval()`, evicting devices unseen for longer
    /// than `config.max_age()`.
    pub fn new(transport: Arc<dyn DiscoveryTransport>, config: DiscoveryConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.channel_capacity);

        let control_point = Arc::new(Self {
            transport,
            registry: RwLock::new(DeviceRegistry::new()),
            events,
            config,
            tasks: Mutex::new(Vec::new()),
        });

        control_point.spawn_pump();
        control_point.spawn_timer();
        control_point
    }

    /// The transport's namespace name
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// The configured capacity for discovery and notification channels
    pub fn channel_capacity(&self) -> usize {
        self.config.channel_capacity
    }

    /// Trigger an active discovery broadcast.
    ///
    /// Idempotent and safe to call concurrently with the timer-driven
    /// search. A transport failure here means the device simply never
    /// appears; it is logged and never surfaced.
    pub async fn search(&self) {
        debug!("discovery broadcast");
        if let Err(e) = self.transport.search().await {
            warn!("discovery broadcast failed: {}", e);
        }
    }

    /// Evict devices unseen for longer than `max_age`, emitting one
    /// `DeviceLost` for each. Returns the eviction count.
    pub fn scrub(&self, max_age: Duration) -> Result<usize> {
        let removed = {
            let mut registry = self.registry.write().map_err(|_| {
                BridgeError::other("Failed to acquire write lock on device registry")
            })?;
            registry.scrub(max_age)
        };

        let count = removed.len();
        for record in removed {
            debug!("scrubbed device {}", record.udn());
            let _ = self.events.send(RegistryEvent::DeviceLost(record));
        }

        Ok(count)
    }

    /// Explicitly evict a device, emitting `DeviceLost` only if it was
    /// still present. Returns whether anything was removed; calling
    /// again for the same device has no additional effect.
    pub fn forget(&self, udn: &Id) -> Result<bool> {
        let removed = {
            let mut registry = self.registry.write().map_err(|_| {
                BridgeError::other("Failed to acquire write lock on device registry")
            })?;
            registry.remove(udn)
        };

        match removed {
            Some(record) => {
                info!("forgot device {}", udn);
                let _ = self.events.send(RegistryEvent::DeviceLost(record));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Subscribe to device-found and device-lost notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Get a tracked device by UDN
    pub fn device(&self, udn: &Id) -> Result<Option<Arc<DeviceRecord>>> {
        let registry = self
            .registry
            .read()
            .map_err(|_| BridgeError::other("Failed to acquire read lock on device registry"))?;
        Ok(registry.get(udn))
    }

    /// All tracked devices
    pub fn devices(&self) -> Result<Vec<Arc<DeviceRecord>>> {
        let registry = self
            .registry
            .read()
            .map_err(|_| BridgeError::other("Failed to acquire read lock on device registry"))?;
        Ok(registry.records())
    }

    /// Number of tracked devices
    pub fn device_count(&self) -> Result<usize> {
        let registry = self
            .registry
            .read()
            .map_err(|_| BridgeError::other("Failed to acquire read lock on device registry"))?;
        Ok(registry.len())
    }

    /// Feed one transport announcement into the registry
    fn observe(&self, announcement: DeviceAnnouncement) -> Result<()> {
        let record = {
            let mut registry = self.registry.write().map_err(|_| {
                BridgeError::other("Failed to acquire write lock on device registry")
            })?;

            if let Some(existing) = registry.get(&announcement.udn) {
                existing.mark_seen();
                debug!("device {} refreshed", existing.udn());
                return Ok(());
            }

            let record = Arc::new(DeviceRecord::from_announcement(announcement));
            registry.observe(record.clone());
            record
        };

        info!(
            "device found: {} ({})",
            record.udn(),
            record.device_type()
        );
        let _ = self.events.send(RegistryEvent::DeviceFound(record));
        Ok(())
    }

    /// Pump transport announcements into the registry
    fn spawn_pump(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut announcements = self.transport.announcements();

        let handle = tokio::spawn(async move {
            loop {
                match announcements.recv().await {
                    Ok(announcement) => {
                        let Some(control_point) = weak.upgrade() else {
                            break;
                        };
                        match announcement {
                            Announcement::Alive(description) => {
                                if let Err(e) = control_point.observe(description) {
                                    warn!("failed to record discovery response: {}", e);
                                }
                            }
                            Announcement::Gone(udn) => {
                                debug!("transport reports device gone: {}", udn);
                                match control_point.forget(&udn) {
                                    Ok(true) => {}
                                    Ok(false) => debug!("gone device {} was not tracked", udn),
                                    Err(e) => warn!("failed to forget device {}: {}", udn, e),
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("announcement pump lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Periodically kick off a new search to find devices that have
    /// come online, then scrub the ones that have not answered
    fn spawn_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.search_interval();
        let max_age = self.config.max_age();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; discovery start-up
            // is driven by DeviceBridge::discover instead.
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(control_point) = weak.upgrade() else {
                    break;
                };

                control_point.search().await;
                match control_point.scrub(max_age) {
                    Ok(0) => {}
                    Ok(count) => debug!("scrubbed {} stale devices", count),
                    Err(e) => warn!("scrub pass failed: {}", e),
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::sim::{SimDevice, SimEndpoint, SimTransport};
    use thingbridge_core::types::Value;
    use tokio_test::assert_ok;

    /// Settings that keep the background timer out of the way
    fn quiet_config() -> DiscoveryConfig {
        DiscoveryConfig {
            search_interval_secs: 3600,
            max_age_secs: 60,
            channel_capacity: 64,
        }
    }

    fn sample_device(udn: &str) -> SimDevice {
        SimDevice::new(udn, "urn:Sample:1")
            .with_endpoint(SimEndpoint::new("urn:Sample:Switch"))
            .with_metadata("friendlyName", Value::from("Desk Lamp"))
    }

    async fn recv_event(rx: &mut broadcast::Receiver<RegistryEvent>) -> RegistryEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for registry event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_device_found_emitted_once_per_udn() {
        let transport = SimTransport::new();
        let control_point = ControlPoint::new(transport.clone(), quiet_config());
        let mut events = control_point.subscribe();

        transport.add_device(sample_device("uuid:1"));
        let event = recv_event(&mut events).await;
        assert!(matches!(event, RegistryEvent::DeviceFound(ref r) if r.udn().as_str() == "uuid:1"));

        // Further searches refresh the record without re-emitting
        control_point.search().await;
        control_point.search().await;
        tokio::task::yield_now().await;

        assert!(events.try_recv().is_err());
        assert_eq!(control_point.device_count().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrub_emits_device_lost_and_counts() {
        let transport = SimTransport::new();
        let control_point = ControlPoint::new(transport.clone(), quiet_config());
        let mut events = control_point.subscribe();

        // A one-shot announcement: the device never answers again
        transport.announce_once(sample_device("uuid:stale").announcement());
        recv_event(&mut events).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        transport.add_device(sample_device("uuid:fresh"));
        recv_event(&mut events).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let count = assert_ok!(control_point.scrub(Duration::from_secs(60)));
        assert_eq!(count, 1);

        let event = recv_event(&mut events).await;
        assert!(
            matches!(event, RegistryEvent::DeviceLost(ref r) if r.udn().as_str() == "uuid:stale")
        );
        assert_eq!(control_point.device_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forget_is_idempotent() {
        let transport = SimTransport::new();
        let control_point = ControlPoint::new(transport.clone(), quiet_config());
        let mut events = control_point.subscribe();

        transport.add_device(sample_device("uuid:1"));
        recv_event(&mut events).await;

        let udn = Id::from("uuid:1");
        assert!(assert_ok!(control_point.forget(&udn)));
        let event = recv_event(&mut events).await;
        assert!(matches!(event, RegistryEvent::DeviceLost(_)));

        // Second forget removes nothing and emits nothing
        assert!(!control_point.forget(&udn).unwrap());
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transport_gone_signal_forgets() {
        let transport = SimTransport::new();
        let control_point = ControlPoint::new(transport.clone(), quiet_config());
        let mut events = control_point.subscribe();

        transport.add_device(sample_device("uuid:1"));
        recv_event(&mut events).await;

        transport.remove_device(&Id::from("uuid:1"));
        let event = recv_event(&mut events).await;
        assert!(matches!(event, RegistryEvent::DeviceLost(_)));
        assert_eq!(control_point.device_count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_searches_and_scrubs() {
        let transport = SimTransport::new();
        let config = DiscoveryConfig {
            search_interval_secs: 20,
            max_age_secs: 60,
            channel_capacity: 64,
        };
        let control_point = ControlPoint::new(transport.clone(), config);
        let mut events = control_point.subscribe();

        // One-shot device: timer-driven searches will not refresh it
        transport.announce_once(sample_device("uuid:quiet").announcement());
        recv_event(&mut events).await;

        let searches_before = transport.search_count();
        // Step past four timer periods one at a time; a single large
        // advance would collapse the delayed ticks into one
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(21)).await;
            tokio::task::yield_now().await;
        }

        // Each elapsed period issued a broadcast, and the scrub pass
        // after the device crossed max-age evicted it
        assert!(transport.search_count() >= searches_before + 3);
        let event = recv_event(&mut events).await;
        assert!(
            matches!(event, RegistryEvent::DeviceLost(ref r) if r.udn().as_str() == "uuid:quiet")
        );
    }
}
