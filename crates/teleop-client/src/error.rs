//! Error types.
//!
//! None of these cross the channel handle: the running channel absorbs them
//! into its state and reports them to the observer.

use std::path::PathBuf;

/// Failure to open or use a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("unsupported endpoint scheme: {0:?}")]
    UnsupportedScheme(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed")]
    Closed,
}

/// Failure to load or validate a channel configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
