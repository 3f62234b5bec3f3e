/// A frame that could not become a message, or a message that could not
/// become a frame.
///
/// Inbound failures cost only the offending frame; the connection stays
/// open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[cfg(feature = "json")]
    #[error("could not encode message: {0}")]
    Encode(serde_json::Error),

    /// Not JSON, unknown `type`, or missing or mistyped fields.
    #[cfg(feature = "json")]
    #[error("could not decode frame: {0}")]
    Decode(serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
