//! graphql-ws frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::Result;

/// Frame kinds of the graphql-ws protocol. Unknown kinds fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Client → server: open the connection.
    ConnectionInit,
    /// Server → client: connection accepted.
    ConnectionAck,
    /// Server → client: connection rejected.
    ConnectionError,
    /// Client → server: close the connection.
    ConnectionTerminate,
    /// Client → server: start an operation.
    Start,
    /// Client → server: stop an operation.
    Stop,
    /// Server → client: operation result.
    Data,
    /// Server → client: operation error.
    Error,
    /// Server → client: operation finished.
    Complete,
    /// Server → client: keep-alive.
    #[serde(rename = "ka")]
    KeepAlive,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Operation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Frame payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Frame {
    fn new(kind: FrameKind, id: Option<String>, payload: Option<Value>) -> Self {
        Self { kind, id, payload }
    }

    /// `connection_init` with an optional payload.
    pub fn init(payload: Option<Value>) -> Self {
        Self::new(FrameKind::ConnectionInit, None, payload)
    }

    /// `start` for operation `id`.
    pub fn start(id: impl Into<String>, payload: Value) -> Self {
        Self::new(FrameKind::Start, Some(id.into()), Some(payload))
    }

    /// `stop` for operation `id`.
    pub fn stop(id: impl Into<String>) -> Self {
        Self::new(FrameKind::Stop, Some(id.into()), None)
    }

    /// `connection_terminate`.
    pub fn terminate() -> Self {
        Self::new(FrameKind::ConnectionTerminate, None, None)
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as JSON text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode as a websocket text message.
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(self.encode()?.into()))
    }
}
