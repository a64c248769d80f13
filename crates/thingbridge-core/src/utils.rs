/*!
 * Utility functions and helpers for thingbridge.
 */
use std::future::Future;

use tracing::{debug, warn};

/// Create a task that runs in the background
///
/// # Arguments
///
/// * `fut` - The future to run
///
/// # Returns
///
/// A handle to the spawned task
pub fn spawn_task<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut)
}

/// Create a fire-and-forget task that logs its own failure
///
/// Used for dispatch paths whose errors must never reach the caller,
/// such as per-action invocations during a push.
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(_) => {
                debug!("Task '{}' completed successfully", task_name);
            }
            Err(e) => {
                warn!("Task '{}' failed: {}", task_name, e);
            }
        }
    })
}
