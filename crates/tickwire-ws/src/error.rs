//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Short label for reconnect metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectTimeout(_) => "connect_failed",
            Self::ConnectionClosed { .. } => "server_closed",
            Self::Tungstenite(_) => "transport_error",
            Self::Json(_) => "encode_error",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
