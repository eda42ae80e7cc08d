//! Terminal teleop dashboard.
//!
//! Keeps a channel to the vehicle gateway, prints connection changes and a
//! telemetry line every second, and reads drive commands from stdin:
//!
//!   forward [speed] | backward [speed] | left | right | stop
//!   target X Y | start | reconnect | quit
//!
//! Run:
//!   cargo run -p teleop-demo-dashboard -- --endpoint ws://127.0.0.1:8765/ws

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use teleop_client::{Channel, ChannelConfig, ChannelHandle, Command, Direction, TelemetrySnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_SPEED: u32 = 150;

#[derive(Parser)]
#[command(name = "teleop-dashboard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway WebSocket URL. Overrides the config file.
    #[arg(long, env = "TELEOP_ENDPOINT")]
    endpoint: Option<String>,
    /// TOML channel configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seconds between telemetry lines.
    #[arg(long, default_value_t = 1)]
    every: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("teleop_client=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ChannelConfig::load(path)?,
        None => ChannelConfig::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }

    println!("Connecting to {}", config.endpoint);
    let channel = Channel::connect(config)?;

    let printer = tokio::spawn(print_updates(
        channel.handle(),
        Duration::from_secs(args.every.max(1)),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_input(line) {
            Ok(Input::Quit) => break,
            Ok(Input::Reconnect) => channel.reconnect(),
            Ok(Input::Send(command)) => {
                if !channel.is_connected() {
                    println!("(not connected, {} dropped)", command.name());
                }
                channel.send_command(command);
            }
            Err(e) => println!("{e}"),
        }
    }

    printer.abort();
    channel.shutdown().await;
    Ok(())
}

async fn print_updates(handle: ChannelHandle, every: Duration) {
    let mut state = handle.watch_state();
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("[{current}]");
            }
            _ = interval.tick() => {
                if let Some(t) = handle.telemetry() {
                    println!("{}", format_telemetry(&t));
                }
            }
        }
    }
}

fn format_telemetry(t: &TelemetrySnapshot) -> String {
    let num = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    let mut line = format!(
        "speed {} m/s  pos ({}, {})  heading {}",
        num(t.speed),
        num(t.x_position),
        num(t.y_position),
        num(t.heading),
    );
    if let Some((side, cm)) = t.nearest_obstacle() {
        line.push_str(&format!("  nearest {side:?} {cm:.0} cm"));
    }
    line
}

enum Input {
    Send(Command),
    Reconnect,
    Quit,
}

fn parse_input(line: &str) -> anyhow::Result<Input> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        bail!("empty command");
    };

    let input = match word {
        "quit" | "exit" => Input::Quit,
        "reconnect" => Input::Reconnect,
        "start" => Input::Send(Command::start()),
        "target" => {
            let x = words.next().context("usage: target X Y")?.parse()?;
            let y = words.next().context("usage: target X Y")?.parse()?;
            Input::Send(Command::set_target(x, y))
        }
        other => {
            let direction: Direction = other.parse()?;
            if direction == Direction::Stop {
                Input::Send(Command::stop())
            } else {
                let speed = match words.next() {
                    Some(s) => s.parse::<u32>().context("speed must be 0-255")?.min(255),
                    None => DEFAULT_SPEED,
                };
                Input::Send(Command::manual(direction, speed))
            }
        }
    };
    Ok(input)
}
