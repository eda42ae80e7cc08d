//! Vehicle gateway server.

use crate::vehicle::Vehicle;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use teleop_core::{ClientFrame, ServerFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::tungstenite::Message;

const TICK: Duration = Duration::from_millis(100);

type SharedVehicle = Arc<RwLock<Vehicle>>;

pub async fn run(port: u16, flaky: Option<Duration>) -> anyhow::Result<()> {
    let vehicle = Arc::new(RwLock::new(Vehicle::new()));
    let (broadcast_tx, _) = broadcast::channel::<String>(16);

    // Physics + telemetry loop
    let tick_vehicle = vehicle.clone();
    let tick_broadcast = broadcast_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            let mut v = tick_vehicle.write().await;
            v.tick(TICK.as_secs_f64());
            match ServerFrame::telemetry(v.telemetry()).encode() {
                Ok(text) => {
                    let _ = tick_broadcast.send(text);
                }
                Err(e) => tracing::warn!("Failed to encode telemetry: {}", e),
            }
        }
    });

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}/ws", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let vehicle = vehicle.clone();
        let broadcast_tx = broadcast_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, vehicle, broadcast_tx, flaky).await
            {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    vehicle: SharedVehicle,
    broadcast_tx: broadcast::Sender<String>,
    flaky: Option<Duration>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let mut telemetry_rx = broadcast_tx.subscribe();

    tracing::info!("Dashboard connected from {}", addr);

    let kill = async {
        match flaky {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(kill);

    loop {
        tokio::select! {
            // Control frame from the dashboard
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let ClientFrame::Control { payload } = match ClientFrame::decode(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::debug!("Ignoring frame from {}: {}", addr, e);
                                continue;
                            }
                        };
                        let mut v = vehicle.write().await;
                        match v.apply(&payload) {
                            Ok(()) => tracing::info!("{} -> {}", addr, payload.name()),
                            Err(e) => tracing::warn!("{} rejected: {}", payload.name(), e),
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            // Telemetry tick
            text = telemetry_rx.recv() => {
                match text {
                    Ok(text) => sink.send(Message::Text(text.into())).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("{} lagged by {} frames", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // Simulated link drop
            _ = &mut kill => {
                tracing::info!("Dropping {} (flaky mode)", addr);
                return Ok(());
            }
        }
    }

    tracing::info!("Dashboard {} disconnected", addr);
    Ok(())
}
