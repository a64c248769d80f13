/*!
 * Error types for the thingbridge core crate.
 */
use thiserror::Error;

/// Error type for thingbridge core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event system error
    #[error("Event error: {0}")]
    Event(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for thingbridge core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new event error
    pub fn event<S: AsRef<str>>(msg: S) -> Self {
        Error::Event(msg.as_ref().to_string())
    }

    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers() {
        assert!(matches!(Error::config("bad"), Error::Config(_)));
        assert!(matches!(Error::event("bad"), Error::Event(_)));
        assert!(matches!(Error::runtime("bad"), Error::Runtime(_)));
        assert!(matches!(Error::timeout("slow"), Error::Timeout(_)));
        assert!(matches!(Error::other("misc"), Error::Other(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::config("missing section");
        assert_eq!(err.to_string(), "Configuration error: missing section");
    }
}
