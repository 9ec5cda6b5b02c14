//! `/ws` endpoint: WebSocket upgrade and the adapter between axum's socket
//! halves and the chat core's transport traits.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use forum_chat::{ChatError, Dispatcher, FrameSink, FrameSource, SessionTask};
use forum_core::{Frame, PeerId};
use tracing::warn;

use crate::server::AppState;

/// Read half of an upgraded socket.
pub struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Result<Option<Frame>, ChatError> {
        loop {
            match self.0.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text.to_string()))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data))),
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => return Err(ChatError::TransportRead(e.to_string())),
            }
        }
    }
}

/// Write half of an upgraded socket.
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), ChatError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| ChatError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        SinkExt::close(&mut self.0)
            .await
            .map_err(|e| ChatError::TransportWrite(e.to_string()))
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            let err = ChatError::Upgrade(rejection.body_text());
            warn!(remote = %remote, error = %err, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(move |e: axum::Error| {
        let err = ChatError::Upgrade(e.to_string());
        warn!(remote = %remote, error = %err, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        // Fire and forget: the session cleans up after itself.
        let _task = accept(
            socket,
            PeerId::from_addr(remote),
            &state.dispatcher,
            state.send_queue_capacity,
        );
    })
}

/// Attach an upgraded socket to the chat core.
pub fn accept(
    socket: WebSocket,
    peer_id: PeerId,
    dispatcher: &Dispatcher,
    send_queue_capacity: usize,
) -> SessionTask {
    let (sink, stream) = socket.split();
    let (_session, task) = forum_chat::attach(
        dispatcher,
        peer_id,
        send_queue_capacity,
        WsSource(stream),
        WsSink(sink),
    );
    task
}
