//! Transport abstraction.
//!
//! Opening a socket is split in two. [`Transport::prepare`] runs synchronously
//! inside the state machine's turn and is where malformed endpoints are
//! rejected; [`Transport::open`] runs on a spawned task and reports failure
//! as a transport error followed by a close.

use crate::error::TransportError;
use std::future::Future;

/// Something the channel can receive from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// Binary payloads are not part of the protocol; only the size is kept.
    Binary(usize),
    /// The peer closed the connection.
    Close { code: Option<u16>, reason: String },
}

pub trait Transport: Send + Sync + 'static {
    type Request: Send + 'static;
    type Connection: Connection;

    /// Validate `endpoint` and build a connection request.
    fn prepare(&self, endpoint: &str) -> Result<Self::Request, TransportError>;

    /// Perform the handshake.
    fn open(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

pub trait Connection: Send + 'static {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next inbound item. `None` once the stream has ended.
    ///
    /// Must be cancel-safe: the runtime races it against outbound traffic.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Inbound, TransportError>>> + Send;

    fn close(
        &mut self,
        code: u16,
        reason: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
