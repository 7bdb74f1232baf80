//! Transport abstraction
//!
//! A [`Transport`] carries self-delimited text frames over one duplex
//! connection; a [`Connector`] dials a fresh transport. The WebSocket pair is
//! what the client uses against a real server; the in-memory pair backs tests
//! and embedders that want to drive the protocol without a socket.

use crate::error::{MsmpError, Result};
use crate::messages::{Request, Response};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// One live duplex connection carrying text frames
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one frame
    async fn write(&self, frame: String) -> Result<()>;

    /// Read the next frame. Fails once the connection is closed or broken.
    async fn read(&self) -> Result<String>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Dials new transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Transport>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the server over WebSocket, authenticating with a bearer token
pub struct WebSocketConnector {
    url: String,
    secret: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| MsmpError::Connection(e.to_string()))?;

        if !self.secret.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.secret))
                .map_err(|e| MsmpError::Connection(format!("invalid secret: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }

        debug!("Connecting to {}", self.url);
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| MsmpError::Connection(e.to_string()))?;

        let (sink, stream) = stream.split();
        Ok(Arc::new(WebSocketTransport {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }))
    }
}

/// WebSocket transport. Writers share the sink; only the read loop reads.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn write(&self, frame: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| MsmpError::Transport(e.to_string()))
    }

    async fn read(&self) -> Result<String> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map_err(|e| MsmpError::Protocol(format!("non-UTF-8 frame: {}", e)));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(MsmpError::Transport(format!(
                        "connection closed by server: {:?}",
                        frame
                    )));
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(MsmpError::Transport(e.to_string())),
                None => return Err(MsmpError::Transport("connection closed".into())),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| MsmpError::Transport(e.to_string()))
    }
}

/// In-process connector. Every successful `connect` hands the server side of
/// the new connection to the paired [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            refuse: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Make subsequent dials fail (or succeed again)
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of dial attempts so far, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(MsmpError::Connection("connection refused".into()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            tx: Some(to_client),
            rx: Some(from_client),
        };
        self.peers
            .send(peer)
            .map_err(|_| MsmpError::Connection("listener dropped".into()))?;

        Ok(Arc::new(MemoryTransport {
            tx: parking_lot::Mutex::new(Some(to_server)),
            rx: Mutex::new(from_server),
        }))
    }
}

/// Accepts connections dialed through a [`MemoryConnector`]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

/// Client side of an in-memory connection
pub struct MemoryTransport {
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&self, frame: String) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| MsmpError::Transport("transport closed".into()))?;
        tx.send(frame)
            .map_err(|_| MsmpError::Transport("peer stopped reading".into()))
    }

    async fn read(&self) -> Result<String> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| MsmpError::Transport("connection closed".into()))
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().take();
        Ok(())
    }
}

/// Server side of an in-memory connection
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl MemoryPeer {
    /// Next frame written by the client; `None` once the client closed
    pub async fn recv(&mut self) -> Option<String> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Next frame written by the client, decoded as a request
    pub async fn recv_request(&mut self) -> Option<Request> {
        let frame = self.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Push a raw frame to the client
    pub fn send(&self, frame: impl Into<String>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| MsmpError::Transport("peer hung up".into()))?;
        tx.send(frame.into())
            .map_err(|_| MsmpError::Transport("client stopped reading".into()))
    }

    pub fn respond(&self, response: &Response) -> Result<()> {
        self.send(response.to_frame()?)
    }

    /// Stop accepting client frames; further client writes fail
    pub fn close_inbound(&mut self) {
        self.rx.take();
    }

    /// Drop the connection from the server side; the client's next read fails
    pub fn hang_up(&mut self) {
        self.tx.take();
        self.rx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let (connector, mut listener) = MemoryConnector::pair();
        let transport = connector.connect().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        let request = Request::new(1, "minecraft:players", Value::Null);
        transport.write(request.to_frame().unwrap()).await.unwrap();
        assert_eq!(peer.recv_request().await.unwrap(), request);

        peer.respond(&Response::success(1, Value::Null)).unwrap();
        assert_eq!(
            transport.read().await.unwrap(),
            r#"{"id":1,"jsonrpc":"2.0","result":null}"#
        );
    }

    #[tokio::test]
    async fn test_memory_refuse() {
        let (connector, _listener) = MemoryConnector::pair();
        connector.set_refuse(true);

        let result = connector.connect().await;
        assert!(matches!(result, Err(MsmpError::Connection(_))));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_memory_hang_up_fails_read() {
        let (connector, mut listener) = MemoryConnector::pair();
        let transport = connector.connect().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        peer.hang_up();
        assert!(matches!(transport.read().await, Err(MsmpError::Transport(_))));
        assert!(matches!(
            transport.write("{}".to_string()).await,
            Err(MsmpError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_close_ends_peer_stream() {
        let (connector, mut listener) = MemoryConnector::pair();
        let transport = connector.connect().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        transport.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(transport.write("{}".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        let connector = WebSocketConnector::new("ws://127.0.0.1:1/ws", "secret");
        let result = connector.connect().await;
        assert!(matches!(result, Err(MsmpError::Connection(_))));
    }

    #[tokio::test]
    async fn test_websocket_invalid_url() {
        let connector = WebSocketConnector::new("not a url", "secret");
        let result = connector.connect().await;
        assert!(matches!(result, Err(MsmpError::Connection(_))));
    }
}
