//! In-memory transport doubles for session tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forum_core::Frame;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::transport::{FrameSink, FrameSource};

/// Test side of a `ScriptedSource`: push what the "peer" sends.
pub struct SourceFeed {
    tx: mpsc::UnboundedSender<Result<Option<Frame>, ChatError>>,
}

impl SourceFeed {
    pub fn send(&self, frame: impl Into<Frame>) {
        let _ = self.tx.send(Ok(Some(frame.into())));
    }

    pub fn fail(&self, detail: &str) {
        let _ = self.tx.send(Err(ChatError::TransportRead(detail.to_string())));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Ok(None));
    }
}

pub struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Result<Option<Frame>, ChatError>>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn recv(&mut self) -> Result<Option<Frame>, ChatError> {
        // A dropped feed looks like the peer going away.
        self.rx.recv().await.unwrap_or(Ok(None))
    }
}

pub fn scripted_source() -> (SourceFeed, ScriptedSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SourceFeed { tx }, ScriptedSource { rx })
}

#[derive(Default)]
struct SinkState {
    sent: Mutex<Vec<Frame>>,
    closes: AtomicUsize,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    attempts: AtomicUsize,
}

/// Inspects what a `RecordingSink` was asked to do.
#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<SinkState>,
}

impl SinkProbe {
    pub fn sent(&self) -> Vec<Frame> {
        self.state.sent.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Make every `send` hang, like a peer whose receive window is full.
    pub fn stall_writes(&self) {
        self.state.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Number of `send` calls made, including stalled ones.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

pub struct RecordingSink {
    state: Arc<SinkState>,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, frame: Frame) -> Result<(), ChatError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(ChatError::TransportWrite("broken pipe".into()));
        }
        self.state.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn recording_sink() -> (RecordingSink, SinkProbe) {
    let state = Arc::new(SinkState::default());
    (
        RecordingSink {
            state: Arc::clone(&state),
        },
        SinkProbe { state },
    )
}

/// Poll `condition` until it holds, failing the test after one second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 1s");
}
