//! Client-side error types.

use awachat_shared::ProtocolError;

/// Errors surfaced by the connection manager's fallible operations.
///
/// The manager itself never propagates these out of its event loop; they are
/// logged, reported to the notifier, or returned from `try_*` calls.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The base URL handed to `init` could not be parsed.
    #[error("invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The base URL uses a scheme other than http(s)/ws(s).
    #[error("unsupported scheme `{0}`, expected http or https")]
    UnsupportedScheme(String),

    /// No bearer token available from the credential store.
    #[error("no authentication token available")]
    AuthMissing,

    /// A send was attempted while the socket is not open.
    #[error("socket is not open")]
    NotOpen,

    /// The outbound envelope could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The manager's event loop is no longer running.
    #[error("connection manager has stopped")]
    Stopped,
}

/// Failures of the underlying socket implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open socket: {0}")]
    Open(String),

    #[error("socket closed")]
    Closed,
}

/// Invalid values in the environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value `{value}` for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}
