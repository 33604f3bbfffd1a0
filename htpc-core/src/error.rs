use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised by the notification, remote-method and routing contracts
///
/// Subscription and execution failures are returned as values so the caller
/// can decide what to do; startup failures (`Startup`, `NotHandling`) mean the
/// component cannot operate at all.
#[derive(Debug, Error)]
pub enum HtpcError {
    /// The component does not publish this notification
    #[error("Unknown notification '{0}'")]
    UnknownNotification(String),

    /// The method is not part of the host's method catalog
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    /// Parameters did not match the method's parameter schema
    #[error("Invalid parameters for {method}: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: ValidationError,
    },

    /// The remote reply did not match the method's returns schema
    #[error("Invalid reply for {method}: {source}")]
    InvalidReply {
        method: String,
        #[source]
        source: ValidationError,
    },

    /// The request could not be delivered or answered
    #[error("Transport error calling {method}: {message}")]
    Transport { method: String, message: String },

    /// A call was made before `start()` opened the channel
    #[error("Component '{0}' has not been started")]
    NotStarted(String),

    /// An event handler ended up wired to nothing
    #[error("EventHandler '{0}' is not handling anything")]
    NotHandling(String),

    /// The component failed to initialize
    #[error("Failed to start '{name}': {message}")]
    Startup { name: String, message: String },

    /// The cron scheduler could not be started or stopped
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Result type for htpc-core operations
pub type Result<T> = std::result::Result<T, HtpcError>;
