//! WebSocket transport over `tokio-tungstenite`.

use crate::error::TransportError;
use crate::transport::{Connection, Inbound, Transport};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    type Request = Request;
    type Connection = WsConnection;

    fn prepare(&self, endpoint: &str) -> Result<Request, TransportError> {
        let request =
            endpoint
                .into_client_request()
                .map_err(|e| TransportError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => Ok(request),
            other => Err(TransportError::UnsupportedScheme(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    async fn open(&self, request: Request) -> Result<WsConnection, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(WsConnection { stream })
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            };

            let inbound = match message {
                Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Inbound::Binary(bytes.len()),
                Message::Close(frame) => match frame {
                    Some(frame) => Inbound::Close {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => Inbound::Close {
                        code: None,
                        reason: String::new(),
                    },
                },
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(inbound));
        }
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        match self.stream.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
