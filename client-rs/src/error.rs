//! Error types for the MSMP client

use crate::container::CorrelationError;
use crate::messages::RpcError;
use thiserror::Error;

/// Errors that can occur when using the MSMP client
#[derive(Error, Debug)]
pub enum MsmpError {
    /// `connect` was called while a connection is live
    #[error("Client already connected")]
    AlreadyConnected,

    /// Not currently connected to the server
    #[error("Not connected")]
    NotConnected,

    /// Dialing the server failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reading, writing or closing the transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Writing a request frame failed; the pending entry was rolled back
    #[error("Failed to send request: {0}")]
    Send(String),

    /// The server sent a frame that is not valid JSON-RPC
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Registering, cancelling or resolving a correlation id failed
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// A blocking call exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// The session was shut down while the call was waiting
    #[error("Client disconnected")]
    Disconnected,

    /// The server answered with a JSON-RPC error object
    #[error("Server error: {0}")]
    Server(RpcError),

    /// Failed to serialize/deserialize a message
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for MSMP operations
pub type Result<T> = std::result::Result<T, MsmpError>;
