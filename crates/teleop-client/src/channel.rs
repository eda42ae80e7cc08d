//! Channel runtime and subscriber surface.
//!
//! A [`Channel`] owns one driver task. The driver is the only place the
//! [`ConnectionManager`] lives: socket tasks, retry timers and
//! [`ChannelHandle`]s all talk to it through a single unbounded intake, so
//! every state transition runs to completion before the next event is looked
//! at.
//!
//! Readers get the connection state and the latest telemetry through `watch`
//! channels. Both slots are replaced whole; two reads may see two different
//! values.

use crate::config::ChannelConfig;
use crate::error::ConfigError;
use crate::manager::{Action, ConnectionManager, Event, Generation, NORMAL_CLOSURE, TimerId};
use crate::observer::{ChannelObserver, TracingObserver};
use crate::transport::{Connection, Inbound, Transport};
use crate::ws::WsTransport;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use teleop_core::{Command, ConnectionState, TelemetrySnapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type TelemetrySlot = Option<Arc<TelemetrySnapshot>>;

/// A running telemetry/control channel.
///
/// Dropping the channel tears it down, the same as [`Channel::shutdown`]
/// without waiting.
pub struct Channel {
    handle: ChannelHandle,
    task: Option<JoinHandle<()>>,
}

impl Channel {
    /// Connect to `config.endpoint` over WebSocket, logging through `tracing`.
    pub fn connect(config: ChannelConfig) -> Result<Self, ConfigError> {
        Self::spawn(config, WsTransport, Arc::new(TracingObserver))
    }

    /// Start a channel on the current Tokio runtime and issue the first
    /// connect request.
    pub fn spawn<T: Transport>(
        config: ChannelConfig,
        transport: T,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (intake, events) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (telemetry_tx, telemetry_rx) = watch::channel(None);

        let driver = Driver {
            manager: ConnectionManager::new(&config, observer),
            transport: Arc::new(transport),
            endpoint: config.endpoint,
            intake: intake.clone(),
            events,
            state_tx,
            telemetry_tx,
            link: None,
            timer: None,
        };

        // Queued before the driver starts, so it is the first event handled.
        let _ = intake.send(Event::ConnectRequested);
        let task = tokio::spawn(driver.run());

        Ok(Self {
            handle: ChannelHandle {
                intake,
                state: state_rx,
                telemetry: telemetry_rx,
            },
            task: Some(task),
        })
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Tear the channel down and wait for the driver to finish.
    ///
    /// Any pending retry is cancelled and an open socket is closed with a
    /// normal-closure code. Handles stay readable afterwards; their sends are
    /// dropped.
    pub async fn shutdown(mut self) {
        let _ = self.handle.intake.send(Event::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("channel driver ended abnormally: {}", e);
        }
    }
}

impl std::ops::Deref for Channel {
    type Target = ChannelHandle;

    fn deref(&self) -> &ChannelHandle {
        &self.handle
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.handle.intake.send(Event::Shutdown);
        }
    }
}

/// Read-mostly view of a channel. Cheap to clone.
#[derive(Clone)]
pub struct ChannelHandle {
    intake: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ConnectionState>,
    telemetry: watch::Receiver<TelemetrySlot>,
}

impl ChannelHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The latest snapshot, or `None` before the first telemetry frame.
    pub fn telemetry(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.telemetry.borrow().clone()
    }

    /// Send a control command with extra fields. Fire-and-forget: dropped
    /// unless the channel is connected when the command is processed.
    pub fn send(&self, command: impl Into<String>, data: Map<String, Value>) {
        self.send_command(Command::with_data(command, data));
    }

    pub fn send_command(&self, command: Command) {
        if self.intake.send(Event::Send(command)).is_err() {
            tracing::debug!("control dropped: channel driver has stopped");
        }
    }

    /// Clear the failure count and connect again. Does nothing while a
    /// connection is already up or being made.
    pub fn reconnect(&self) {
        let _ = self.intake.send(Event::ReconnectRequested);
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn watch_telemetry(&self) -> watch::Receiver<TelemetrySlot> {
        self.telemetry.clone()
    }
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct Link {
    generation: Generation,
    outbound: mpsc::UnboundedSender<Outbound>,
}

struct Driver<T: Transport> {
    manager: ConnectionManager,
    transport: Arc<T>,
    endpoint: String,
    intake: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    state_tx: watch::Sender<ConnectionState>,
    telemetry_tx: watch::Sender<TelemetrySlot>,
    link: Option<Link>,
    timer: Option<(TimerId, JoinHandle<()>)>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.dispatch(event);
            if self.manager.is_shut_down() {
                break;
            }
        }

        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
        tracing::debug!("channel driver stopped");
    }

    fn dispatch(&mut self, event: Event) {
        let mut queue: VecDeque<Action> = self.manager.handle(event).into();
        while let Some(action) = queue.pop_front() {
            if let Some(follow_up) = self.execute(action) {
                queue.extend(self.manager.handle(follow_up));
            }
        }

        let state = self.manager.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Carry out one action. Socket creation is answered synchronously.
    fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::Open { generation } => match self.transport.prepare(&self.endpoint) {
                Ok(request) => {
                    let (outbound, outbound_rx) = mpsc::unbounded_channel();
                    tokio::spawn(run_link(
                        self.transport.clone(),
                        request,
                        generation,
                        self.intake.clone(),
                        outbound_rx,
                    ));
                    self.link = Some(Link {
                        generation,
                        outbound,
                    });
                    Some(Event::OpenStarted { generation })
                }
                Err(e) => Some(Event::OpenFailed {
                    generation,
                    reason: e.to_string(),
                }),
            },
            Action::Close {
                generation,
                code,
                reason,
            } => {
                if let Some(link) = self.link.take_if(|l| l.generation == generation) {
                    let _ = link.outbound.send(Outbound::Close { code, reason });
                }
                None
            }
            Action::Transmit { generation, text } => {
                if let Some(link) = self.link.as_ref().filter(|l| l.generation == generation) {
                    let _ = link.outbound.send(Outbound::Text(text));
                }
                None
            }
            Action::ScheduleRetry { timer, delay } => {
                let intake = self.intake.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = intake.send(Event::RetryElapsed { timer });
                });
                if let Some((_, previous)) = self.timer.replace((timer, handle)) {
                    previous.abort();
                }
                None
            }
            Action::CancelRetry { timer } => {
                if let Some((_, handle)) = self.timer.take_if(|(id, _)| *id == timer) {
                    handle.abort();
                }
                None
            }
            Action::Publish(snapshot) => {
                self.telemetry_tx.send_replace(Some(Arc::new(snapshot)));
                None
            }
        }
    }
}

/// Drive one socket. Everything it learns goes back through the intake tagged
/// with its generation; the manager decides whether it still matters.
async fn run_link<T: Transport>(
    transport: Arc<T>,
    request: T::Request,
    generation: Generation,
    intake: mpsc::UnboundedSender<Event>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut conn = match transport.open(request).await {
        Ok(conn) => conn,
        Err(e) => {
            let reason = e.to_string();
            let _ = intake.send(Event::TransportError {
                generation,
                reason: reason.clone(),
            });
            let _ = intake.send(Event::Closed {
                generation,
                code: None,
                reason,
            });
            return;
        }
    };
    let _ = intake.send(Event::Opened { generation });

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = conn.send_text(text).await {
                        let _ = intake.send(Event::TransportError {
                            generation,
                            reason: e.to_string(),
                        });
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    if let Err(e) = conn.close(code, reason).await {
                        tracing::debug!(%generation, "close failed: {}", e);
                    }
                    return;
                }
                None => {
                    let _ = conn.close(NORMAL_CLOSURE, "superseded".to_string()).await;
                    return;
                }
            },
            inbound = conn.recv() => match inbound {
                Some(Ok(Inbound::Text(text))) => {
                    let _ = intake.send(Event::Frame { generation, text });
                }
                Some(Ok(Inbound::Binary(len))) => {
                    let _ = intake.send(Event::BinaryFrame { generation, len });
                }
                Some(Ok(Inbound::Close { code, reason })) => {
                    let _ = intake.send(Event::Closed { generation, code, reason });
                    return;
                }
                Some(Err(e)) => {
                    let reason = e.to_string();
                    let _ = intake.send(Event::TransportError {
                        generation,
                        reason: reason.clone(),
                    });
                    let _ = intake.send(Event::Closed {
                        generation,
                        code: None,
                        reason,
                    });
                    return;
                }
                None => {
                    let _ = intake.send(Event::Closed {
                        generation,
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}
