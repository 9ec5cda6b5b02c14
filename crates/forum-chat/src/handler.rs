use std::sync::Arc;

use forum_core::PeerId;
use tracing::{info, warn};

use crate::broadcast::Dispatcher;
use crate::session::{PeerSession, SessionTask};
use crate::transport::{FrameSink, FrameSource};

/// Turn an upgraded connection into a live chat peer: build the session,
/// register it, start both loops, and return without waiting on them.
///
/// If another session already holds `peer_id` (a reconnect from the same
/// endpoint), it is replaced and told to shut down.
pub fn attach<R, W>(
    dispatcher: &Dispatcher,
    peer_id: PeerId,
    queue_capacity: usize,
    reader: R,
    writer: W,
) -> (Arc<PeerSession>, SessionTask)
where
    R: FrameSource,
    W: FrameSink,
{
    let (session, outbound_rx) = PeerSession::new(peer_id, queue_capacity);

    if let Some(displaced) = dispatcher.registry().register(Arc::clone(&session)) {
        warn!(
            peer_id = %session.id(),
            displaced = %displaced.connection_id(),
            "peer id reused, shutting down previous session"
        );
        displaced.shutdown();
    }

    info!(
        peer_id = %session.id(),
        connection_id = %session.connection_id(),
        peers = dispatcher.registry().len(),
        "peer connected"
    );

    let task = session.spawn(outbound_rx, reader, writer, dispatcher.clone());
    (session, task)
}
