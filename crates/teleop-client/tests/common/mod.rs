//! Scripted in-memory transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teleop_client::{
    Channel, ChannelConfig, ChannelHandle, Connection, ConnectionState, Inbound, NoopObserver,
    Transport, TransportError,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How the next handshake ends.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    Refuse,
}

/// What the client pushed at the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<Outcome>>,
    prepares: Mutex<Vec<Instant>>,
    opens: Mutex<Vec<Instant>>,
}

pub struct MockTransport {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// Test-side controls for a [`MockTransport`].
pub struct MockControl {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

pub fn mock() -> (MockTransport, MockControl) {
    let shared = Arc::new(Shared::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            shared: shared.clone(),
            peers: tx,
        },
        MockControl { shared, peers: rx },
    )
}

impl MockControl {
    /// Queue handshake outcomes. Once the script runs out, handshakes succeed.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.shared.script.lock().unwrap().extend(outcomes);
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.shared.opens.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.lock().unwrap().len()
    }

    pub fn prepare_times(&self) -> Vec<Instant> {
        self.shared.prepares.lock().unwrap().clone()
    }

    pub async fn next_peer(&mut self) -> MockPeer {
        tokio::time::timeout(Duration::from_secs(300), self.peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}

impl Transport for MockTransport {
    type Request = ();
    type Connection = MockConnection;

    fn prepare(&self, endpoint: &str) -> Result<(), TransportError> {
        self.shared.prepares.lock().unwrap().push(Instant::now());
        if endpoint.starts_with("bad:") {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "rejected by mock".to_string(),
            });
        }
        Ok(())
    }

    async fn open(&self, _request: ()) -> Result<MockConnection, TransportError> {
        self.shared.opens.lock().unwrap().push(Instant::now());
        let outcome = self
            .shared
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Accept);

        match outcome {
            Outcome::Refuse => Err(TransportError::Closed),
            Outcome::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();
                let _ = self.peers.send(MockPeer {
                    to_client,
                    from_client,
                });
                Ok(MockConnection { inbound, outbound })
            }
        }
    }
}

pub struct MockConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Sent>,
}

impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Sent::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        let _ = self.outbound.send(Sent::Close { code, reason });
        Ok(())
    }
}

/// Server side of one accepted connection. Dropping it ends the stream.
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<Inbound>,
    from_client: mpsc::UnboundedReceiver<Sent>,
}

impl MockPeer {
    pub fn push(&self, text: &str) {
        let _ = self.to_client.send(Inbound::Text(text.to_string()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Inbound::Close {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub async fn next(&mut self) -> Option<Sent> {
        tokio::time::timeout(Duration::from_secs(60), self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn try_next(&mut self) -> Option<Sent> {
        self.from_client.try_recv().ok()
    }
}

pub fn spawn(transport: MockTransport) -> Channel {
    spawn_with(ChannelConfig::new("ws://vehicle.test/ws"), transport)
}

pub fn spawn_with(config: ChannelConfig, transport: MockTransport) -> Channel {
    Channel::spawn(config, transport, Arc::new(NoopObserver)).expect("valid config")
}

pub async fn wait_for_state(handle: &ChannelHandle, state: ConnectionState) {
    let mut rx = handle.watch_state();
    tokio::time::timeout(Duration::from_secs(300), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("channel dropped");
}

/// Gaps between consecutive instants, rounded to whole milliseconds.
pub fn gaps_ms(times: &[Instant]) -> Vec<u64> {
    times
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect()
}

/// True when `actual` is within a few milliseconds of `expected`.
pub fn close_to(actual: &[u64], expected: &[u64]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| *a >= *e && *a <= *e + 5)
}
