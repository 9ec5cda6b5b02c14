/// Failures on a chat connection. None of these escape the session they
/// happen on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Protocol negotiation failed; no session was created.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// Terminal for the session. The read loop tears it down.
    #[error("transport read failed: {0}")]
    TransportRead(String),

    /// Terminal for the write side only.
    #[error("transport write failed: {0}")]
    TransportWrite(String),
}

impl ChatError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Upgrade(_) => "upgrade",
            Self::TransportRead(_) => "transport_read",
            Self::TransportWrite(_) => "transport_write",
        }
    }
}
