//! Reconnecting telemetry/control channel for vehicle teleoperation.
//!
//! The vehicle gateway streams telemetry frames; the dashboard pushes control
//! commands back. This crate keeps one WebSocket to the gateway alive across
//! network drops, backs off on repeated failure, and gives the rest of the
//! application three things: a connected flag, the latest
//! [`TelemetrySnapshot`], and a fire-and-forget `send`.
//!
//! ```no_run
//! # async fn demo() -> Result<(), teleop_client::ConfigError> {
//! use teleop_client::{Channel, ChannelConfig, Command, Direction};
//!
//! let channel = Channel::connect(ChannelConfig::new("ws://192.168.4.1:81/ws"))?;
//! channel.send_command(Command::manual(Direction::Forward, 150));
//! if let Some(t) = channel.telemetry() {
//!     println!("speed: {:?}", t.speed);
//! }
//! channel.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod channel;
mod config;
mod error;
mod manager;
mod observer;
mod transport;
mod ws;

pub use backoff::BackoffPolicy;
pub use channel::{Channel, ChannelHandle};
pub use config::ChannelConfig;
pub use error::{ConfigError, TransportError};
pub use manager::{Action, ConnectionManager, Event, Generation, NORMAL_CLOSURE, TimerId};
pub use observer::{ChannelObserver, IgnoredConnect, NoopObserver, TracingObserver};
pub use transport::{Connection, Inbound, Transport};
pub use ws::{WsConnection, WsTransport};

pub use teleop_core::{Command, ConnectionState, Direction, TelemetrySnapshot};
