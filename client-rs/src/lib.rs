//! MSMP Rust Client
//!
//! An async JSON-RPC 2.0 client for the Minecraft Server Management Protocol.
//! One WebSocket connection carries many concurrent requests; responses are
//! matched to callers by id, dropped connections are re-established in the
//! background, and server-pushed notifications are routed to a handler.
//!
//! # Example
//!
//! ```no_run
//! use msmp_client::{MsmpClient, MsmpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MsmpConfig::new("ws://localhost:25576", "your-secret");
//!     let client = MsmpClient::new(config);
//!
//!     client.connect().await?;
//!
//!     // Blocking call
//!     let response = client.call("minecraft:server/status", serde_json::Value::Null).await?;
//!     println!("{:?}", response);
//!
//!     // Callback call
//!     client.call_with_callback("minecraft:players", serde_json::Value::Null, |request, response| {
//!         println!("{} -> {:?}", request.method, response);
//!     }).await?;
//!
//!     // Fire-and-forget
//!     client.notify("minecraft:server/save", serde_json::json!({"flush": true})).await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod container;
mod error;
mod handler;
mod messages;
mod transport;

pub use client::{ConnectionState, MsmpClient, MsmpClientBuilder};
pub use config::{MsmpConfig, PendingPolicy};
pub use container::{CorrelationError, MapMessageContainer, MessageContainer, PendingEntry};
pub use error::{MsmpError, Result};
pub use handler::{
    logging_handler, logging_notification_handler, DefaultHandler, NotificationHandler,
    ResponseCallback,
};
pub use messages::{
    Frame, Request, RequestId, Response, RpcError, ServerNotification, JSONRPC_VERSION,
    NOTIFICATION_ID,
};
pub use transport::{
    Connector, MemoryConnector, MemoryListener, MemoryPeer, MemoryTransport, Transport,
    WebSocketConnector, WebSocketTransport,
};
