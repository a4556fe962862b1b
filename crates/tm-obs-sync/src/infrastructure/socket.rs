//! WebSocket plumbing shared by the OBS and Tournament Manager clients.
//!
//! Each client keeps its socket split in two halves: a reader task owns the
//! [`WsSource`] and the client keeps the [`WsSink`] inside a [`SocketWriter`]
//! so any number of callers can send through it.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::application::ClientError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, WsMessage>;
pub type WsSource = SplitStream<WsStream>;

/// Opens a client connection to `url`.
///
/// # Errors
///
/// [`ClientError::Connect`] when the connection or the HTTP upgrade fails or
/// does not finish within `timeout`.
pub async fn open(url: &str, timeout: Duration) -> Result<WsStream, ClientError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(ClientError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(ClientError::Connect {
            url: url.to_string(),
            reason: format!("no answer within {timeout:?}"),
        }),
    }
}

/// Reads frames until the next text frame.
///
/// Returns `None` once the peer closed the socket or the socket failed.
/// Ping/Pong are answered by tungstenite itself and skipped here.
pub async fn next_text<S>(stream: &mut S) -> Option<String>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return Some(text),
            Ok(WsMessage::Close(reason)) => {
                debug!("peer closed the socket: {reason:?}");
                return None;
            }
            Ok(WsMessage::Binary(_)) => debug!("ignoring binary frame"),
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
            Err(e) => {
                debug!("socket read failed: {e}");
                return None;
            }
        }
    }
    None
}

/// Serializes `value` and sends it on an unsplit stream (used during handshakes).
pub async fn send_json_on(stream: &mut WsStream, value: &impl Serialize) -> Result<(), ClientError> {
    let text = to_json(value)?;
    stream
        .send(WsMessage::Text(text))
        .await
        .map_err(|_| ClientError::ConnectionLost)
}

fn to_json(value: &impl Serialize) -> Result<String, ClientError> {
    serde_json::to_string(value).map_err(|e| ClientError::Protocol(e.to_string()))
}

/// The shared write half of the current connection, if any.
#[derive(Default)]
pub struct SocketWriter {
    sink: Mutex<Option<WsSink>>,
}

impl SocketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the write half of a fresh connection.
    pub async fn attach(&self, sink: WsSink) {
        let previous = self.sink.lock().await.replace(sink);
        if let Some(mut previous) = previous {
            let _ = previous.close().await;
        }
    }

    /// Closes and forgets the current write half.
    pub async fn detach(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.close().await;
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Serializes `value` as one text frame.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] without a connection;
    /// [`ClientError::ConnectionLost`] when the send fails, after which the
    /// write half is dropped.
    pub async fn send_json(&self, value: &impl Serialize) -> Result<(), ClientError> {
        let text = to_json(value)?;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = sink.send(WsMessage::Text(text)).await {
            debug!("socket write failed: {e}");
            *guard = None;
            return Err(ClientError::ConnectionLost);
        }
        Ok(())
    }
}
