//! Diagnostics hook.
//!
//! The channel never surfaces errors through its handle. Everything worth
//! knowing (retries, dropped sends, bad frames) goes to a [`ChannelObserver`]
//! supplied at construction.

use crate::manager::Generation;
use std::time::Duration;
use teleop_core::{Command, ConnectionState};

/// Why a connect request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredConnect {
    /// A socket is already connecting or connected.
    AlreadyActive(ConnectionState),
    /// The retry ceiling has been reached.
    RetriesExhausted,
    /// The channel has been torn down.
    ShutDown,
}

/// Receives channel diagnostics. Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait ChannelObserver: Send + Sync + 'static {
    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {}

    /// `attempt` counts from 1 since the last successful connection.
    fn connect_attempt(&self, generation: Generation, attempt: u32) {}

    fn connect_ignored(&self, reason: IgnoredConnect) {}

    /// The transport could not be constructed at all.
    fn open_failed(&self, generation: Generation, error: &str) {}

    fn retry_scheduled(&self, attempt: u32, delay: Duration) {}

    fn retries_exhausted(&self, attempts: u32) {}

    fn transport_error(&self, generation: Generation, error: &str) {}

    fn closed(&self, generation: Generation, code: Option<u16>, reason: &str, intentional: bool) {}

    /// An inbound frame that could not be decoded.
    fn frame_discarded(&self, reason: &str) {}

    /// A well-formed inbound frame of a type the channel does not act on.
    fn frame_ignored(&self, text: &str) {}

    fn control_sent(&self, command: &Command) {}

    fn send_dropped(&self, command: &Command, reason: &str) {}

    /// An event arrived from a superseded socket.
    fn stale_event(&self, generation: Generation) {}
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ChannelObserver for NoopObserver {}

/// Observer that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ChannelObserver for TracingObserver {
    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {
        tracing::info!(%from, %to, "channel state changed");
    }

    fn connect_attempt(&self, generation: Generation, attempt: u32) {
        tracing::info!(%generation, attempt, "connecting");
    }

    fn connect_ignored(&self, reason: IgnoredConnect) {
        match reason {
            IgnoredConnect::RetriesExhausted => {
                tracing::warn!("connect ignored: max reconnection attempts reached")
            }
            other => tracing::debug!(?other, "connect ignored"),
        }
    }

    fn open_failed(&self, generation: Generation, error: &str) {
        tracing::error!(%generation, error, "failed to construct transport");
    }

    fn retry_scheduled(&self, attempt: u32, delay: Duration) {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(attempt, delay_ms, "reconnect scheduled");
    }

    fn retries_exhausted(&self, attempts: u32) {
        tracing::warn!(attempts, "max reconnection attempts reached, giving up");
    }

    fn transport_error(&self, generation: Generation, error: &str) {
        tracing::error!(%generation, error, "transport error");
    }

    fn closed(&self, generation: Generation, code: Option<u16>, reason: &str, intentional: bool) {
        tracing::info!(%generation, ?code, reason, intentional, "connection closed");
    }

    fn frame_discarded(&self, reason: &str) {
        tracing::warn!(reason, "discarding inbound frame");
    }

    fn frame_ignored(&self, text: &str) {
        tracing::trace!(text, "ignoring inbound frame");
    }

    fn control_sent(&self, command: &Command) {
        tracing::debug!(command = command.name(), "control sent");
    }

    fn send_dropped(&self, command: &Command, reason: &str) {
        tracing::warn!(command = command.name(), reason, "control not sent");
    }

    fn stale_event(&self, generation: Generation) {
        tracing::trace!(%generation, "event from superseded socket");
    }
}
