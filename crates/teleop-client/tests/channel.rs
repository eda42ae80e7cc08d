mod common;

use common::{Outcome, Sent, close_to, gaps_ms, mock, spawn, spawn_with, wait_for_state};
use serde_json::json;
use std::time::Duration;
use teleop_client::{ChannelConfig, Command, ConnectionState, Direction, NORMAL_CLOSURE};
use tokio::time::{Instant, sleep};

const FULL: &str = r#"{"type":"telemetry","data":{"speed":12.5,"x_position":1,"y_position":"2.5","heading":90,"distance_front":40,"distance_left":80,"distance_right":75}}"#;

#[tokio::test(start_paused = true)]
async fn backoff_then_gives_up_after_five_attempts() {
    let (transport, control) = mock();
    control.script([Outcome::Refuse; 10]);
    let channel = spawn(transport);

    sleep(Duration::from_secs(600)).await;

    let opens = control.open_times();
    assert_eq!(opens.len(), 5, "initial attempt plus four retries");
    let gaps = gaps_ms(&opens);
    assert!(close_to(&gaps, &[3_000, 6_000, 12_000, 24_000]), "{gaps:?}");
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!channel.is_connected());

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn success_resets_retry_counter() {
    let (transport, mut control) = mock();
    control.script([Outcome::Refuse, Outcome::Refuse, Outcome::Refuse, Outcome::Accept]);
    let channel = spawn(transport);

    let peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;
    assert_eq!(control.opens(), 4);

    control.script([Outcome::Refuse]);
    let dropped_at = Instant::now();
    drop(peer);
    sleep(Duration::from_secs(10)).await;

    // Counter restarts at the base delay, then grows again.
    let opens = control.open_times();
    assert_eq!(opens.len(), 6);
    let waited = (opens[4] - dropped_at).as_millis() as u64;
    assert!((3_000..=3_005).contains(&waited), "waited {waited}ms");
    let gaps = gaps_ms(&opens[4..]);
    assert!(close_to(&gaps, &[6_000]), "{gaps:?}");

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn telemetry_is_replaced_not_merged() {
    let (transport, mut control) = mock();
    let channel = spawn(transport);
    let mut telemetry = channel.watch_telemetry();
    assert!(channel.telemetry().is_none());

    let peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;

    peer.push(FULL);
    telemetry.changed().await.unwrap();
    let full = telemetry.borrow_and_update().clone().unwrap();
    assert_eq!(full.speed, Some(12.5));
    assert_eq!(full.y_position, Some(2.5));
    assert_eq!(full.distance_right, Some(75.0));

    peer.push("}{ definitely not json");
    peer.push(r#"{"type":"heartbeat"}"#);
    sleep(Duration::from_millis(50)).await;
    assert!(!telemetry.has_changed().unwrap());
    assert_eq!(channel.telemetry().as_deref(), Some(&*full));
    assert!(channel.is_connected());

    peer.push(r#"{"type":"telemetry","data":{"speed":42}}"#);
    telemetry.changed().await.unwrap();
    let partial = channel.telemetry().unwrap();
    assert_eq!(partial.speed, Some(42.0));
    assert_eq!(partial.heading, None);
    assert_eq!(partial.x_position, None);
    assert_eq!(partial.distance_front, None);

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_is_dropped_while_disconnected() {
    let (transport, mut control) = mock();
    control.script([Outcome::Refuse]);
    let channel = spawn(transport);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    channel.send_command(Command::stop());
    channel.send("setTarget", json!({"x": 1, "y": 2}).as_object().unwrap().clone());

    // Retry at 3s succeeds.
    let mut peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;

    let data = json!({"direction": "forward", "speed": 150});
    channel.send("manual", data.as_object().unwrap().clone());
    assert_eq!(
        peer.next().await,
        Some(Sent::Text(
            r#"{"type":"control","payload":{"command":"manual","direction":"forward","speed":150}}"#
                .to_string()
        ))
    );

    channel.send_command(Command::manual(Direction::Left, 90));
    let Some(Sent::Text(text)) = peer.next().await else {
        panic!("expected a control frame");
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["payload"]["direction"], "left");
    assert!(peer.try_next().is_none());

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_retry() {
    let (transport, control) = mock();
    control.script([Outcome::Refuse; 10]);
    let channel = spawn(transport);
    let handle = channel.handle();

    sleep(Duration::from_secs(4)).await;
    assert_eq!(control.opens(), 2);

    channel.shutdown().await;
    sleep(Duration::from_secs(600)).await;

    assert_eq!(control.opens(), 2);
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    handle.send_command(Command::stop());
    handle.reconnect();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(control.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn teardown_closes_live_socket_normally() {
    let (transport, mut control) = mock();
    let channel = spawn(transport);
    let handle = channel.handle();

    let mut peer = control.next_peer().await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    channel.shutdown().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    match peer.next().await {
        Some(Sent::Close { code, .. }) => assert_eq!(code, NORMAL_CLOSURE),
        other => panic!("expected close frame, got {other:?}"),
    }

    sleep(Duration::from_secs(600)).await;
    assert_eq!(control.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn construction_failure_retries_on_fixed_delay() {
    let (transport, control) = mock();
    let channel = spawn_with(ChannelConfig::new("bad:endpoint"), transport);
    let mut state = channel.watch_state();

    sleep(Duration::from_secs(600)).await;

    let prepares = control.prepare_times();
    assert_eq!(prepares.len(), 5);
    let gaps = gaps_ms(&prepares);
    assert!(close_to(&gaps, &[5_000; 4]), "{gaps:?}");
    assert_eq!(control.opens(), 0);
    // Never reported as connecting.
    assert!(!state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_close_triggers_retry() {
    let (transport, mut control) = mock();
    let channel = spawn(transport);

    let peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;
    let closed_at = Instant::now();
    peer.close(1001, "going away");
    wait_for_state(&channel, ConnectionState::Disconnected).await;

    let _peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;
    let waited = (control.open_times()[1] - closed_at).as_millis() as u64;
    assert!((3_000..=3_005).contains(&waited), "waited {waited}ms");

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_is_idempotent_and_revives_exhausted_channel() {
    let (transport, mut control) = mock();
    control.script([Outcome::Refuse; 5]);
    let channel = spawn(transport);

    sleep(Duration::from_secs(600)).await;
    assert_eq!(control.opens(), 5);
    assert_eq!(channel.state(), ConnectionState::Disconnected);

    channel.reconnect();
    let _peer = control.next_peer().await;
    wait_for_state(&channel, ConnectionState::Connected).await;

    channel.reconnect();
    channel.reconnect();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(control.opens(), 6);
    assert!(channel.is_connected());

    channel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_channel_tears_down() {
    let (transport, control) = mock();
    control.script([Outcome::Refuse; 10]);
    let channel = spawn(transport);
    let handle = channel.handle();

    sleep(Duration::from_secs(1)).await;
    drop(channel);
    sleep(Duration::from_secs(600)).await;

    assert_eq!(control.opens(), 1);
    assert!(!handle.is_connected());
}
