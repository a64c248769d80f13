/*!
 * Transport implementations for thingbridge.
 *
 * Concrete network transports live outside this crate; what ships here
 * is the simulated transport used for integration testing and demos.
 */

// Export transport implementations
pub mod sim;

// Re-export the simulated transport for convenience
pub use sim::{SimDevice, SimEndpoint, SimTransport};
