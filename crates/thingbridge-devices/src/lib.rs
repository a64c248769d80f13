/*!
 * thingbridge Devices
 *
 * This crate is the device bridge engine: discovery of networked
 * devices, a UDN-keyed registry with staleness eviction, driver
 * instances implementing the uniform driver contract, per-service
 * state-change subscriptions, and identity resolution.
 */

#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

// Re-export core prelude
pub use thingbridge_core::prelude;

pub mod control_point;
pub mod device;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod registry;
pub mod subscription;
pub mod transport;
pub mod transports;

// Re-export the engine surface
pub use control_point::{ControlPoint, RegistryEvent};
pub use device::DeviceRecord;
pub use driver::{
    BridgeDriver, DeviceBridge, Driver, DriverEvent, DriverState, PulledUpdate, PushValues,
    SetupConfig,
};
pub use endpoint::{EndpointFailure, ServiceEndpoint};
pub use error::{BridgeError, Result};
pub use identity::Identity;
pub use registry::DeviceRegistry;
pub use subscription::{Subscription, SubscriptionStatus};
pub use transport::{Announcement, DeviceAnnouncement, DiscoveryTransport};

/// thingbridge devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device bridge engine
pub fn init() -> Result<()> {
    tracing::info!("thingbridge Devices {} initialized", VERSION);
    Ok(())
}
