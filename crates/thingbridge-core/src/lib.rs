/*!
 * thingbridge Core
 *
 * This crate provides the shared runtime support for the thingbridge
 * device bridge: identifiers and values, the event bus, configuration,
 * and logging.
 */

#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// thingbridge core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("thingbridge Core {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
