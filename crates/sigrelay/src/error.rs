use thiserror::Error;

/// Errors that can occur while serving a signaling connection.
#[derive(Error, Debug)]
pub enum SignalError {
    /// WebSocket handshake or transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
