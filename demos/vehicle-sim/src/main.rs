//! Simulated vehicle gateway.
//!
//! Streams telemetry at 10 Hz to every connected dashboard and applies the
//! control commands they send back:
//! - `manual` with `direction` (forward/backward/left/right/stop) and `speed`
//!   (0-255 motor duty)
//! - `setTarget` with `x`, `y`, then `start` to drive there on its own
//! - `stop`
//!
//! Run:
//!   cargo run -p teleop-demo-vehicle-sim -- --port 8765
//!   cargo run -p teleop-demo-dashboard -- --endpoint ws://127.0.0.1:8765/ws
//!
//! `--flaky N` drops every client after N seconds, to watch the dashboard
//! reconnect.

mod server;
mod vehicle;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vehicle_sim=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg(&args, "--port").unwrap_or(8765);
    let flaky = parse_arg(&args, "--flaky").map(|secs| std::time::Duration::from_secs(secs.into()));

    tracing::info!("Starting simulated vehicle on port {}", port);
    if let Some(after) = flaky {
        tracing::info!("Dropping clients every {:?}", after);
    }

    server::run(port, flaky).await
}

fn parse_arg(args: &[String], flag: &str) -> Option<u16> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
