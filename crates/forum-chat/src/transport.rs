use async_trait::async_trait;
use forum_core::Frame;

use crate::error::ChatError;

/// Inbound half of a peer connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next data frame. `Ok(None)` means the peer closed the
    /// connection cleanly. Control traffic is handled below this layer.
    async fn recv(&mut self) -> Result<Option<Frame>, ChatError>;
}

/// Outbound half of a peer connection. Not safe for concurrent use; the
/// session serializes access behind a lock.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send(&mut self, frame: Frame) -> Result<(), ChatError>;

    /// Close the underlying transport. Called once per session.
    async fn close(&mut self) -> Result<(), ChatError>;
}
