//! Protocol-level error types.

/// Failure to interpret an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The text is not a `{type, data}` envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// The envelope parsed but `data` does not match the shape its tag requires.
    #[error("malformed `{tag}` payload: {source}")]
    MalformedPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    pub fn payload(tag: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedPayload {
            tag: tag.into(),
            source,
        }
    }
}
