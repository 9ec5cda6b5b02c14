use std::sync::Arc;

use forum_core::{Frame, PeerId};
use tracing::debug;

use crate::registry::ConnectionRegistry;

/// Why a frame did not reach one recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    QueueFull,
    Closing,
}

/// Outcome of offering a frame to one recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    Dropped(DropReason),
}

/// Per-broadcast tally. Drops are expected and never an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fans a sender's frames out to every other registered peer.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Offer `frame` to every registered peer except `sender`. Never blocks:
    /// a peer whose queue is full or who is shutting down simply misses this
    /// frame and the rest still get it.
    pub fn broadcast(&self, sender: &PeerId, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.registry.for_each_except(sender, |session| {
            match session.enqueue(frame.clone()) {
                Delivery::Enqueued => report.delivered += 1,
                Delivery::Dropped(reason) => {
                    report.dropped += 1;
                    debug!(
                        peer_id = %session.id(),
                        sender = %sender,
                        reason = ?reason,
                        "recipient not ready, dropping frame"
                    );
                }
            }
        });
        report
    }
}
