//! Error types for the XBMC host

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XbmcError {
    /// The schema endpoint could not be reached or answered with a failure
    #[error("Failed to load schema from {url}: {reason}")]
    Discovery { url: String, reason: String },

    /// The schema document does not have the expected shape
    #[error("Malformed schema document: {0}")]
    Schema(String),

    /// An environment override could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, XbmcError>;
