//! Error types for the beacon sync client.

use thiserror::Error;

/// Result type alias using beacon's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for beacon operations.
///
/// None of these escape the three runtime components: the connection
/// manager, notification store, and freshness watcher turn every failure
/// into a logged fallback. Collaborators (HTTP API, transports) return them.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP/network request failed before a response was received
    #[error("Request error: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A notification record matched neither accepted field casing
    #[error("Malformed notification record: {0}")]
    MalformedRecord(String),

    /// Push channel could not be opened or broke irrecoverably
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Error::Request(e.to_string()),
        }
    }
}
