/*!
 * Driver instances and the uniform driver contract.
 *
 * A driver instance binds one discovered device to the protocol-
 * agnostic contract the layer above consumes: discovery, reachability,
 * subscription setup, outbound push, upward pulled updates, metadata,
 * and identity. Instances are created by discovery and move through
 * `Unbound → Bound → Subscribing → Subscribed`, ending in the terminal
 * `Lost` state once their device is forgotten; a lost instance never
 * rebinds, rediscovery always produces a new one.
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use thingbridge_core::event::SharedEventBus;
use thingbridge_core::types::{Id, Metadata, ValueMap};
use thingbridge_core::utils::spawn_and_log;

use crate::control_point::{ControlPoint, RegistryEvent};
use crate::device::DeviceRecord;
use crate::error::Result;
use crate::identity::Identity;
use crate::subscription::Subscription;

/// Outbound values: service-type URN → action id → action arguments
pub type PushValues = HashMap<String, HashMap<String, ValueMap>>;

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverState {
    /// No device attached
    Unbound,
    /// Device attached, no subscriptions
    Bound,
    /// A subscribe request is outstanding
    Subscribing,
    /// At least one subscription is active
    Subscribed,
    /// The device was forgotten; terminal
    Lost,
}

/// Lifecycle notification published by a driver instance
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// The driver changed lifecycle state
    StateChanged {
        /// UDN of the bound device, if any
        udn: Option<Id>,
        /// The previous state
        old_state: DriverState,
        /// The new state
        new_state: DriverState,
    },
}

/// A state change propagated upward from a subscription
#[derive(Debug, Clone, Serialize)]
pub struct PulledUpdate {
    /// The service-type URN the change arrived on
    pub service_type: String,
    /// The changed state variables
    pub values: ValueMap,
    /// When the bridge received the change
    pub received_at: DateTime<Utc>,
}

/// Subscription configuration passed to `setup`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Service-type URNs to subscribe to
    #[serde(default)]
    pub subscribe: Vec<String>,
}

impl SetupConfig {
    /// Build a configuration subscribing to the given service URNs
    pub fn subscribe_to<I, S>(urns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subscribe: urns.into_iter().map(Into::into).collect(),
        }
    }
}

/// The uniform driver contract consumed by the layer above.
///
/// Every operation absorbs its own failures: errors surface only
/// through logs and a subsequent `reachable() == false`, never as a
/// result the caller must handle.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// The driver namespace identifier, e.g. `bridge-driver:sim`
    fn driver_id(&self) -> &str;

    /// Whether a device is bound and not lost
    fn reachable(&self) -> bool;

    /// Establish the subscriptions requested in `config`.
    ///
    /// No-op when unbound or lost. An unresolvable service URN is
    /// logged and skipped without failing the rest of the setup.
    async fn setup(&self, config: &SetupConfig);

    /// Dispatch outbound action calls.
    ///
    /// No-op when unbound or lost. Each action is invoked fire-and-
    /// forget; an unresolvable service skips only that service, and a
    /// failed call never aborts its siblings.
    async fn push(&self, values: &PushValues);

    /// Request current state.
    ///
    /// This transport exposes no synchronous state query; updates only
    /// arrive via subscriptions, so this is a no-op.
    async fn pull(&self);

    /// The bound device's flat scalar metadata; `None` when unbound
    fn meta(&self) -> Option<Metadata>;

    /// The cached identity record.
    ///
    /// Computed once per unbound→bound lifetime; repeated calls return
    /// the identical record. `None` for a driver that never bound.
    fn identity(&self) -> Option<Arc<Identity>>;

    /// The full identity record, always recomputed.
    ///
    /// Expands the base record with the device's remaining string-
    /// valued metadata fields; never updates the cache. `None` when no
    /// device is bound.
    fn identity_full(&self) -> Option<Identity>;

    /// Attach to the driver's pulled-update channel
    fn subscribe_updates(&self) -> Result<broadcast::Receiver<PulledUpdate>>;

    /// Attach to the driver's lifecycle notification channel
    fn subscribe_lifecycle(&self) -> Result<broadcast::Receiver<DriverEvent>>;
}

#[derive(Debug)]
struct DriverInner {
    driver_id: String,
    state: RwLock<DriverState>,
    record: RwLock<Option<Arc<DeviceRecord>>>,
    identity: RwLock<Option<Arc<Identity>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    events: SharedEventBus,
    watch: Mutex<Option<JoinHandle<()>>>,
}

impl DriverInner {
    fn state(&self) -> DriverState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bound_record(&self) -> Option<Arc<DeviceRecord>> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bound_udn(&self) -> Option<Id> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|record| record.udn().clone())
    }

    /// Move from `from` to `to` if the driver is currently in `from`
    fn transition(&self, from: DriverState, to: DriverState) {
        let changed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == from && from != to {
                *state = to;
                true
            } else {
                false
            }
        };

        if changed {
            let udn = self.bound_udn();
            let _ = self.events.publish(DriverEvent::StateChanged {
                udn,
                old_state: from,
                new_state: to,
            });
        }
    }

    /// Enter the terminal lost state: detach every subscription
    /// listener, drop the binding, stop watching the control point.
    /// Safe to call more than once.
    fn mark_lost(inner: &Arc<Self>) {
        let old_state = {
            let mut state = inner.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == DriverState::Lost {
                return;
            }
            let old_state = *state;
            *state = DriverState::Lost;
            old_state
        };

        let udn = {
            let mut record = inner.record.write().unwrap_or_else(PoisonError::into_inner);
            record.take().map(|record| record.udn().clone())
        };

        let subscriptions = inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscription in &subscriptions {
            subscription.detach_listeners();
        }

        if let Some(watch) = inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watch.abort();
        }

        debug!("{}: device lost, driver unreachable", inner.driver_id);
        let _ = inner.events.publish(DriverEvent::StateChanged {
            udn,
            old_state,
            new_state: DriverState::Lost,
        });
    }

    /// Watch the control point for the loss of the bound device
    fn spawn_watch(inner: &Arc<Self>, control_point: &Arc<ControlPoint>, udn: Id) {
        let weak = Arc::downgrade(inner);
        let mut events = control_point.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RegistryEvent::DeviceLost(record)) if record.udn() == &udn => {
                        if let Some(inner) = weak.upgrade() {
                            DriverInner::mark_lost(&inner);
                        }
                        break;
                    }
                    Ok(_) => {
                        if weak.upgrade().is_none() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
    }
}

/// A driver instance optionally bound to one discovered device
#[derive(Debug)]
pub struct BridgeDriver {
    inner: Arc<DriverInner>,
    control_point: Arc<ControlPoint>,
}

impl BridgeDriver {
    /// Create a driver instance, optionally bound to a device.
    ///
    /// Typically called by discovery; an unbound instance is permanently
    /// unreachable and every operation on it is a no-op.
    pub fn new(control_point: Arc<ControlPoint>, record: Option<Arc<DeviceRecord>>) -> Arc<Self> {
        let driver_id = format!("bridge-driver:{}", control_point.transport_name());
        let state = if record.is_some() {
            DriverState::Bound
        } else {
            DriverState::Unbound
        };

        let inner = Arc::new(DriverInner {
            driver_id,
            state: RwLock::new(state),
            record: RwLock::new(record.clone()),
            identity: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
            events: SharedEventBus::new(),
            watch: Mutex::new(None),
        });

        if let Some(record) = record {
            DriverInner::spawn_watch(&inner, &control_point, record.udn().clone());
        }

        Arc::new(Self {
            inner,
            control_point,
        })
    }

    /// The current lifecycle state
    pub fn state(&self) -> DriverState {
        self.inner.state()
    }

    /// The subscriptions this instance has created
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bound_record(&self) -> Option<Arc<DeviceRecord>> {
        self.inner.bound_record()
    }
}

#[async_trait]
impl Driver for BridgeDriver {
    fn driver_id(&self) -> &str {
        &self.inner.driver_id
    }

    fn reachable(&self) -> bool {
        self.bound_record().is_some() && self.inner.state() != DriverState::Lost
    }

    async fn setup(&self, config: &SetupConfig) {
        let Some(record) = self.bound_record() else {
            debug!("setup ignored: no bound device");
            return;
        };

        debug!("setup: subscribe to {:?}", config.subscribe);

        for service_urn in &config.subscribe {
            if self.inner.state() == DriverState::Lost {
                break;
            }

            let Some(endpoint) = record.service(service_urn) else {
                warn!("setup: service not found: {}", service_urn);
                continue;
            };

            self.inner
                .transition(DriverState::Bound, DriverState::Subscribing);

            let subscription = Subscription::new(service_urn.clone());
            self.inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(subscription.clone());

            // Failure listener: detach both listeners, then forget the
            // device. The ordering keeps a failed subscription free of
            // listeners before anyone observes the loss.
            let failed_task = {
                let weak = Arc::downgrade(&self.inner);
                let control_point = self.control_point.clone();
                let subscription = subscription.clone();
                let udn = record.udn().clone();
                let service_urn = service_urn.clone();
                let mut failures = endpoint.failures();

                tokio::spawn(async move {
                    loop {
                        match failures.recv().await {
                            Ok(failure) => {
                                warn!(
                                    "subscription {} failed: {} (code {})",
                                    service_urn, failure.message, failure.code
                                );
                                subscription.mark_failed();
                                if let Err(e) = control_point.forget(&udn) {
                                    warn!("failed to forget device {}: {}", udn, e);
                                }
                                if let Some(inner) = weak.upgrade() {
                                    DriverInner::mark_lost(&inner);
                                }
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            };

            // State-change listener: the only path by which device
            // state reaches the layer above.
            let state_task = {
                let weak = Arc::downgrade(&self.inner);
                let service_urn = service_urn.clone();
                let mut state_changes = endpoint.state_changes();

                tokio::spawn(async move {
                    loop {
                        match state_changes.recv().await {
                            Ok(values) => {
                                let Some(inner) = weak.upgrade() else {
                                    break;
                                };
                                trace!("pulled update from {}", service_urn);
                                let update = PulledUpdate {
                                    service_type: service_urn.clone(),
                                    values,
                                    received_at: Utc::now(),
                                };
                                if let Err(e) = inner.events.publish(update) {
                                    warn!("failed to publish pulled update: {}", e);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(
                                    "state listener for {} lagged, skipped {} updates",
                                    service_urn, skipped
                                );
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            };

            subscription.attach_listeners(failed_task, state_task);

            debug!("setup: subscribe {}", service_urn);
            match endpoint.subscribe().await {
                Ok(()) => {
                    subscription.mark_active();
                    self.inner
                        .transition(DriverState::Subscribing, DriverState::Subscribed);
                }
                Err(e) => {
                    warn!("setup: subscribe {} failed: {}", service_urn, e);
                    subscription.mark_failed();
                    if let Err(err) = self.control_point.forget(record.udn()) {
                        warn!("failed to forget device {}: {}", record.udn(), err);
                    }
                    DriverInner::mark_lost(&self.inner);
                }
            }
        }
    }

    async fn push(&self, values: &PushValues) {
        let Some(record) = self.bound_record() else {
            debug!("push ignored: no bound device");
            return;
        };

        debug!("push to {}: {} services", record.udn(), values.len());

        for (service_urn, actions) in values {
            let Some(endpoint) = record.service(service_urn) else {
                warn!("push: service not found: {}", service_urn);
                continue;
            };

            for (action_id, args) in actions {
                debug!("push: {} {}", service_urn, action_id);
                let endpoint = endpoint.clone();
                let action = action_id.clone();
                let args = args.clone();

                spawn_and_log(&format!("push:{}:{}", service_urn, action_id), async move {
                    endpoint.invoke_action(&action, &args).await
                });
            }
        }
    }

    async fn pull(&self) {
        if !self.reachable() {
            return;
        }
        // No synchronous state query on this transport; state arrives
        // only through subscriptions.
        trace!("pull requested");
    }

    fn meta(&self) -> Option<Metadata> {
        let record = self.bound_record()?;
        Some(record.scalar_metadata())
    }

    fn identity(&self) -> Option<Arc<Identity>> {
        {
            let cached = self
                .inner
                .identity
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(identity) = cached.as_ref() {
                return Some(identity.clone());
            }
        }

        let record = self.bound_record()?;
        let identity = Arc::new(Identity::base(&self.inner.driver_id, &record));

        let mut cached = self
            .inner
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Some(cached.get_or_insert_with(|| identity).clone())
    }

    fn identity_full(&self) -> Option<Identity> {
        let record = self.bound_record()?;
        Some(Identity::full(&self.inner.driver_id, &record))
    }

    fn subscribe_updates(&self) -> Result<broadcast::Receiver<PulledUpdate>> {
        Ok(self.inner.events.subscribe::<PulledUpdate>()?)
    }

    fn subscribe_lifecycle(&self) -> Result<broadcast::Receiver<DriverEvent>> {
        Ok(self.inner.events.subscribe::<DriverEvent>()?)
    }
}

/// Discovery entry point: wraps each newly found device in a fresh
/// driver instance
#[derive(Debug, Clone)]
pub struct DeviceBridge {
    control_point: Arc<ControlPoint>,
}

impl DeviceBridge {
    /// Create a bridge over a control point
    pub fn new(control_point: Arc<ControlPoint>) -> Self {
        Self { control_point }
    }

    /// The control point this bridge coordinates through
    pub fn control_point(&self) -> &Arc<ControlPoint> {
        &self.control_point
    }

    /// Register interest in discovered devices.
    ///
    /// Each device-found notification yields a new bound driver
    /// instance on the returned channel. Also triggers an immediate
    /// search to speed up discovery. Discovery is unbounded in time;
    /// nothing is ever returned synchronously.
    pub async fn discover(&self) -> mpsc::Receiver<Arc<BridgeDriver>> {
        let mut events = self.control_point.subscribe();
        let (tx, rx) = mpsc::channel(self.control_point.channel_capacity());
        let weak = Arc::downgrade(&self.control_point);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RegistryEvent::DeviceFound(record)) => {
                        let Some(control_point) = weak.upgrade() else {
                            break;
                        };
                        debug!(
                            "discovered device {} ({})",
                            record.udn(),
                            record.device_type()
                        );
                        let driver = BridgeDriver::new(control_point, Some(record));
                        if tx.send(driver).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Always search to speed up device discovery
        self.control_point.search().await;
        rx
    }

    /// Collect the drivers discovered within a bounded window.
    ///
    /// Stops once `window` elapses without a new device.
    pub async fn discover_for(&self, window: Duration) -> Vec<Arc<BridgeDriver>> {
        let mut incoming = self.discover().await;
        let mut drivers = Vec::new();

        loop {
            match tokio::time::timeout(window, incoming.recv()).await {
                Ok(Some(driver)) => drivers.push(driver),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        drivers
    }
}
