//! End-to-end check against a real WebSocket server on localhost.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use teleop_client::{Channel, ChannelConfig, Command, ConnectionState, Direction};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn telemetry_in_control_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received_rx) = oneshot::channel::<(String, Option<u16>)>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::text(r#"{"type":"hello","version":2}"#))
            .await
            .unwrap();
        sink.send(Message::text(
            r#"{"type":"telemetry","data":{"speed":"33.5","heading":180,"battery":91}}"#,
        ))
        .await
        .unwrap();

        let mut control = None;
        let mut close_code = None;
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) if control.is_none() => control = Some(text.as_str().to_owned()),
                Message::Close(frame) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                _ => {}
            }
        }
        let _ = received_tx.send((control.unwrap_or_default(), close_code));
    });

    let channel = Channel::connect(ChannelConfig::new(format!("ws://{addr}/ws"))).unwrap();

    let mut telemetry = channel.watch_telemetry();
    timeout(Duration::from_secs(5), telemetry.wait_for(|t| t.is_some()))
        .await
        .expect("no telemetry")
        .unwrap();
    assert_eq!(channel.state(), ConnectionState::Connected);
    let snapshot = channel.telemetry().unwrap();
    assert_eq!(snapshot.speed, Some(33.5));
    assert_eq!(snapshot.heading, Some(180.0));

    channel.send_command(Command::manual(Direction::Backward, 120));
    channel.shutdown().await;

    let (control, close_code) = timeout(Duration::from_secs(5), received_rx)
        .await
        .expect("server never finished")
        .unwrap();
    assert_eq!(
        control,
        r#"{"type":"control","payload":{"command":"manual","direction":"backward","speed":120}}"#
    );
    assert_eq!(close_code, Some(1000));
    server.await.unwrap();
}
