//! Wire envelopes.
//!
//! Every frame is a JSON object tagged by `type`. The server side of the
//! taxonomy is open: tags this crate does not know decode to
//! [`ServerFrame::Other`] instead of failing.

use crate::{Command, TelemetrySnapshot};
use serde::{Deserialize, Serialize};

/// Frames sent from dashboard to vehicle server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A control command.
    Control { payload: Command },
}

/// Frames sent from vehicle server to dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Current vehicle state.
    Telemetry { data: TelemetrySnapshot },
    /// Any other tag. Never produced by the encoder of a well-behaved server.
    #[serde(other)]
    Other,
}

impl ClientFrame {
    pub fn control(command: Command) -> Self {
        ClientFrame::Control { payload: command }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

impl ServerFrame {
    pub fn telemetry(data: TelemetrySnapshot) -> Self {
        ServerFrame::Telemetry { data }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

/// Error encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),
}
