/*!
 * Discovery transport seam.
 *
 * The transport supplies active discovery broadcast and the
 * asynchronous announcement stream the control point pumps into the
 * registry. Responses never arrive synchronously; a transport error on
 * broadcast is a discovery failure the engine absorbs.
 */
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use thingbridge_core::types::{Id, Metadata};

use crate::endpoint::ServiceEndpoint;
use crate::error::Result;

/// A device materialized from a transport discovery response
#[derive(Debug, Clone)]
pub struct DeviceAnnouncement {
    /// Unique device name
    pub udn: Id,
    /// Device type string
    pub device_type: String,
    /// The service endpoints the device exposes
    pub services: Vec<Arc<dyn ServiceEndpoint>>,
    /// Raw top-level metadata fields
    pub metadata: Metadata,
}

/// A transport-level discovery notification
#[derive(Debug, Clone)]
pub enum Announcement {
    /// A device responded to discovery or announced itself
    Alive(DeviceAnnouncement),
    /// The transport reports a device as gone
    Gone(Id),
}

/// The discovery side of a device transport.
///
/// Implementations broadcast search requests on demand and deliver
/// responses, unsolicited alive notifications, and gone signals on the
/// announcement channel.
#[async_trait]
pub trait DiscoveryTransport: Send + Sync + Debug {
    /// The transport's namespace name, e.g. `upnp` or `sim`.
    ///
    /// Feeds the `driver` field of the identity record.
    fn name(&self) -> &'static str;

    /// Issue an active discovery broadcast.
    ///
    /// Idempotent and safe to call concurrently; results arrive later
    /// on the announcement channel, never as a return value.
    async fn search(&self) -> Result<()>;

    /// Attach to the transport's announcement channel
    fn announcements(&self) -> broadcast::Receiver<Announcement>;
}
