/*!
 * Prelude module for thingbridge Core.
 *
 * This module re-exports commonly used types and functions from the
 * thingbridge core crate to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{Id, Metadata, SharedValue, Value, ValueMap};

// Re-export event types
pub use crate::event::{EventBus, SharedEventBus};

// Re-export config types
pub use crate::config::{Config, DiscoveryConfig, LoggingConfig, SharedConfig};

// Re-export utility functions
pub use crate::utils::{spawn_and_log, spawn_task};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
