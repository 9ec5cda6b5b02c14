use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use forum_core::{ConnectionId, Frame, PeerId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{Delivery, Dispatcher, DropReason};
use crate::transport::{FrameSink, FrameSource};

/// Lifecycle of a peer session. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session's read loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// The transport failed while reading.
    ReadError(String),
    /// Another connection took over this peer id, or shutdown was requested.
    Shutdown,
}

/// A connected chat peer.
///
/// The registry and the dispatcher only ever touch the outbound queue. The
/// transport itself is owned by the session's two loops.
pub struct PeerSession {
    id: PeerId,
    connection_id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
    state: AtomicU8,
    shutdown: CancellationToken,
}

impl PeerSession {
    /// Create a session in `Connecting` state with a bounded outbound queue.
    /// Returns the session and the receiving end of its queue, which belongs
    /// to the write loop.
    pub fn new(id: PeerId, queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let session = Arc::new(Self {
            id,
            connection_id: ConnectionId::new(),
            outbound: tx,
            state: AtomicU8::new(SessionState::Connecting as u8),
            shutdown: CancellationToken::new(),
        });
        (session, rx)
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Non-blocking enqueue onto this peer's outbound queue. A full queue or
    /// a session on its way out drops the frame.
    pub fn enqueue(&self, frame: Frame) -> Delivery {
        if self.state() >= SessionState::Closing {
            return Delivery::Dropped(DropReason::Closing);
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped(DropReason::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dropped(DropReason::Closing),
        }
    }

    /// Ask the session to end. The read loop notices, tears the session down,
    /// and the session's `SessionTask` resolves once that is finished.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Move forward to `to` unless the session is already there or past it.
    fn advance(&self, to: SessionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (raw < to as u8).then_some(to as u8)
            })
            .is_ok()
    }

    /// Launch the read and write loops on the tokio runtime and return
    /// immediately. `outbound_rx` must be the receiver returned by `new`.
    ///
    /// The caller is expected to have registered the session already.
    pub fn spawn<R, W>(
        self: &Arc<Self>,
        outbound_rx: mpsc::Receiver<Frame>,
        reader: R,
        writer: W,
        dispatcher: Dispatcher,
    ) -> SessionTask
    where
        R: FrameSource,
        W: FrameSink,
    {
        self.advance(SessionState::Open);

        let writer = Arc::new(Mutex::new(writer));
        let write_task = tokio::spawn(write_loop(
            Arc::clone(self),
            outbound_rx,
            Arc::clone(&writer),
        ));

        let session = Arc::clone(self);
        let read_task = tokio::spawn(async move {
            let mut reader = reader;
            let reason = read_loop(&session, &mut reader, &dispatcher).await;
            teardown(&session, &dispatcher, write_task, &writer, &reason).await;
            reason
        });

        SessionTask { handle: read_task }
    }
}

/// Handle to a running session. Resolves once both loops have exited and
/// the transport is closed.
pub struct SessionTask {
    handle: JoinHandle<CloseReason>,
}

impl SessionTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session to reach `Closed`. A panicked read loop is
    /// reported as a read error.
    pub async fn join(self) -> CloseReason {
        match self.handle.await {
            Ok(reason) => reason,
            Err(e) => CloseReason::ReadError(format!("session task failed: {e}")),
        }
    }
}

async fn read_loop<R: FrameSource>(
    session: &PeerSession,
    reader: &mut R,
    dispatcher: &Dispatcher,
) -> CloseReason {
    loop {
        let next = tokio::select! {
            biased;
            () = session.shutdown.cancelled() => return CloseReason::Shutdown,
            next = reader.recv() => next,
        };

        match next {
            Ok(Some(frame)) => {
                debug!(peer_id = %session.id, len = frame.len(), "frame received");
                // Inline so frames from one sender are enqueued in arrival order.
                dispatcher.broadcast(&session.id, &frame);
            }
            Ok(None) => return CloseReason::PeerClosed,
            Err(e) => {
                debug!(peer_id = %session.id, error = %e, kind = e.error_kind(), "read failed");
                return CloseReason::ReadError(e.to_string());
            }
        }
    }
}

async fn write_loop<W: FrameSink>(
    session: Arc<PeerSession>,
    mut rx: mpsc::Receiver<Frame>,
    writer: Arc<Mutex<W>>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = session.shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        // `send` can park forever on a peer that stopped reading.
        let mut sink = writer.lock().await;
        let result = tokio::select! {
            biased;
            () = session.shutdown.cancelled() => break,
            result = sink.send(frame) => result,
        };
        drop(sink);

        if let Err(e) = result {
            // The read loop sees the same broken transport and cleans up.
            warn!(peer_id = %session.id, error = %e, "write failed, stopping writer");
            session.advance(SessionState::Closing);
            break;
        }
    }
}

/// Single exit path for a session: unregister, stop the writer, close the
/// transport, mark `Closed`.
async fn teardown<W: FrameSink>(
    session: &Arc<PeerSession>,
    dispatcher: &Dispatcher,
    write_task: JoinHandle<()>,
    writer: &Arc<Mutex<W>>,
    reason: &CloseReason,
) {
    session.advance(SessionState::Closing);
    let removed = dispatcher.registry().unregister_session(session);

    session.shutdown.cancel();
    if let Err(e) = write_task.await {
        warn!(peer_id = %session.id, error = %e, "writer task failed");
    }

    if let Err(e) = writer.lock().await.close().await {
        debug!(peer_id = %session.id, error = %e, "close failed");
    }

    session.advance(SessionState::Closed);
    info!(
        peer_id = %session.id,
        connection_id = %session.connection_id,
        reason = ?reason,
        unregistered = removed,
        "peer disconnected"
    );
}
