//! TCP/WebSocket transport glue.
//!
//! Each accepted socket gets an unbounded channel. The sending half is the
//! connection's [`ChannelHandle`], stored in the registry and cloned into
//! deliveries; the receiving half feeds a writer task that owns the socket's
//! write half. Sends therefore never block and never touch the socket
//! directly.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::{
    Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use wsrelay_core::{ConnectionHandle, OutboundFrame};

use crate::error::ServerError;

/// Send capability for one WebSocket connection.
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ChannelHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConnectionHandle for ChannelHandle {
    fn send(&self, frame: OutboundFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Plain TCP listener for WebSocket upgrades.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Bind to `address` (e.g. "127.0.0.1:8080").
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let listener = bind_tcp(address).await?;
        tracing::info!("WebSocket listener bound to {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// Accept the next TCP connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Parse and bind a TCP address.
pub async fn bind_tcp(address: &str) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))
}

/// Convert a queued frame into a WebSocket message.
pub fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::text(text),
        OutboundFrame::Pong(payload) => Message::Pong(Bytes::from(payload)),
        OutboundFrame::Close { reason } => {
            Message::Close(Some(CloseFrame { code: CloseCode::Normal, reason: reason.into() }))
        },
    }
}

/// Drain queued frames into the socket until a close frame is written, the
/// channel closes, or the socket fails.
pub async fn write_frames<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<OutboundFrame>)
where
    S: Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let closing = matches!(frame, OutboundFrame::Close { .. });
        if sink.send(to_message(frame)).await.is_err() || closing {
            break;
        }
    }

    let _ = sink.close().await;
}

/// Wait up to `grace` for a writer task to finish.
///
/// A writer still running after `grace` is aborted, which drops its queue.
/// Returns `false` in that case.
pub async fn drain_writer(mut writer: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut writer).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("Writer task failed: {}", e);
            true
        },
        Err(_) => {
            writer.abort();
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reports_closed_channel() {
        let (handle, rx) = ChannelHandle::channel();
        assert!(handle.send(OutboundFrame::text("hi")));

        drop(rx);
        assert!(!handle.send(OutboundFrame::text("gone")));
    }

    #[test]
    fn frames_map_to_messages() {
        assert_eq!(to_message(OutboundFrame::text("hello")), Message::text("hello"));
        assert_eq!(
            to_message(OutboundFrame::Pong(vec![1, 2, 3])),
            Message::Pong(Bytes::from_static(&[1, 2, 3]))
        );

        let Message::Close(Some(close)) = to_message(OutboundFrame::close("bye")) else {
            panic!("expected close message");
        };
        assert_eq!(close.code, CloseCode::Normal);
        assert_eq!(close.reason.as_str(), "bye");
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let result = bind_tcp("not an address").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn writer_stops_after_close() {
        let (handle, rx) = ChannelHandle::channel();
        let (sink_tx, sink_rx) = futures::channel::mpsc::unbounded::<Message>();

        handle.send(OutboundFrame::text("one"));
        handle.send(OutboundFrame::close("done"));
        handle.send(OutboundFrame::text("never"));

        write_frames(sink_tx, rx).await;

        let written: Vec<Message> = futures::StreamExt::collect(sink_rx).await;
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], Message::text("one"));
        assert!(matches!(written[1], Message::Close(_)));
    }

    #[tokio::test]
    async fn finished_writer_drains() {
        let writer = tokio::spawn(async {});

        assert!(drain_writer(writer, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn stalled_writer_is_aborted() {
        let (_handle, rx) = ChannelHandle::channel();
        let (sink_tx, _sink_rx) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_frames(sink_tx, rx));

        assert!(!drain_writer(writer, Duration::from_millis(20)).await);
    }
}
