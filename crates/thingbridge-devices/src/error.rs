/*!
 * Error types for the thingbridge devices crate.
 *
 * Most failure conditions in the bridge are absorbed close to where
 * they occur and surface only through logs and `reachable()`; these
 * variants name the conditions for the paths that do return results.
 */
use thiserror::Error;

use thingbridge_core::error::Error as CoreError;

/// Error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The driver has no bound device
    #[error("Device not bound")]
    NotBound,

    /// The requested service URN is absent on the bound device
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// A subscription could not be established or was torn down
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// An action invocation failed
    #[error("Action call failed: {0}")]
    ActionFailed(String),

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device was lost and the operation can no longer apply
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create a new transport error
    pub fn transport<S: AsRef<str>>(msg: S) -> Self {
        BridgeError::Transport(msg.as_ref().to_string())
    }

    /// Create a new subscription error
    pub fn subscription<S: AsRef<str>>(msg: S) -> Self {
        BridgeError::SubscriptionFailed(msg.as_ref().to_string())
    }

    /// Create a new action error
    pub fn action<S: AsRef<str>>(msg: S) -> Self {
        BridgeError::ActionFailed(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        BridgeError::Other(msg.as_ref().to_string())
    }
}
