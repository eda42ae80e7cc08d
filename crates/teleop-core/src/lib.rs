//! Core types for the teleoperation channel.
//!
//! This crate provides the protocol primitives shared by the dashboard client
//! and anything that speaks to it: telemetry snapshots, control commands, and
//! the JSON envelopes that carry them.

mod command;
mod message;
mod telemetry;

pub use command::{Command, Direction, DirectionParseError};
pub use message::{ClientFrame, CodecError, ServerFrame};
pub use telemetry::{ObstacleSide, TelemetrySnapshot};

use std::fmt;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket, or the last one closed.
    #[default]
    Disconnected,
    /// A socket has been created and is waiting for the handshake.
    Connecting,
    /// Normal operation.
    Connected,
}

impl ConnectionState {
    /// The boolean view exposed to dashboards.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while a socket is held, whether or not it has opened yet.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}
