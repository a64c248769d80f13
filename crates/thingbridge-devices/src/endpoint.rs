/*!
 * Service endpoint contract.
 *
 * A service endpoint is a URN-identified capability group exposed by a
 * transport-level device service. Any transport implementing this trait
 * can plug into the engine; a transport that cannot is rejected at bind
 * time by the type system rather than at call time.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use thingbridge_core::types::ValueMap;

use crate::error::Result;

/// A failure reported by a service endpoint on its `failed` channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointFailure {
    /// Transport-specific failure code
    pub code: i32,
    /// Human-readable failure message
    pub message: String,
}

impl EndpointFailure {
    /// Create a new endpoint failure
    pub fn new<S: Into<String>>(code: i32, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The capability set exposed by a transport-level device service.
///
/// An endpoint offers a subscription request, asynchronous action
/// invocation, and two notification channels: `failures` (the `failed`
/// channel) and `state_changes` (the `stateChanged` channel). Listeners
/// attach by holding a receiver and detach by dropping it.
#[async_trait]
pub trait ServiceEndpoint: Send + Sync + Debug {
    /// The service-type URN identifying this endpoint
    fn service_type(&self) -> &str;

    /// Request a state-change subscription on this endpoint.
    ///
    /// Completion of the returned future is the subscribe confirmation;
    /// an error means the subscription was not established. Events
    /// delivered once subscribed arrive on `state_changes`.
    async fn subscribe(&self) -> Result<()>;

    /// Invoke an action on this endpoint.
    ///
    /// The call is non-blocking at the transport level; the future
    /// resolves with the action's output arguments, or an error.
    async fn invoke_action(&self, action_id: &str, args: &ValueMap) -> Result<ValueMap>;

    /// Attach to the endpoint's failure notification channel
    fn failures(&self) -> broadcast::Receiver<EndpointFailure>;

    /// Attach to the endpoint's state-change notification channel
    fn state_changes(&self) -> broadcast::Receiver<ValueMap>;
}
