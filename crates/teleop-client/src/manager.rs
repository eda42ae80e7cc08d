//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] performs no I/O. It consumes [`Event`]s one at a time
//! and answers with the [`Action`]s the runtime must carry out. Every socket it
//! asks for gets a fresh [`Generation`]; events tagged with anything but the
//! current generation are dropped, so a late close from a superseded socket can
//! never touch the state of a newer one.
//!
//! ```text
//!                 connect request
//!  Disconnected ───────────────────▶ Connecting ──── open ────▶ Connected
//!       ▲                                 │                          │
//!       └───────────── close ─────────────┴────────── close ─────────┘
//!                (retry timer scheduled unless intentional / exhausted)
//! ```

use crate::backoff::BackoffPolicy;
use crate::config::ChannelConfig;
use crate::observer::{ChannelObserver, IgnoredConnect};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use teleop_core::{ClientFrame, Command, ConnectionState, ServerFrame, TelemetrySnapshot};

/// WebSocket close code for a normal, application-initiated closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Startup or manual connect.
    ConnectRequested,
    /// Manual connect that first clears the failure count.
    ReconnectRequested,
    /// A scheduled retry came due.
    RetryElapsed { timer: TimerId },
    /// The runtime created the socket for `generation`.
    OpenStarted { generation: Generation },
    /// The runtime could not create the socket for `generation`.
    OpenFailed { generation: Generation, reason: String },
    Opened { generation: Generation },
    Frame { generation: Generation, text: String },
    BinaryFrame { generation: Generation, len: usize },
    TransportError { generation: Generation, reason: String },
    Closed {
        generation: Generation,
        code: Option<u16>,
        reason: String,
    },
    Send(Command),
    Shutdown,
}

/// Work the runtime must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a socket. Must be answered with `OpenStarted` or `OpenFailed`
    /// before any other event is handled.
    Open { generation: Generation },
    /// Close and forget a socket. Its later events are stale.
    Close {
        generation: Generation,
        code: u16,
        reason: String,
    },
    Transmit { generation: Generation, text: String },
    ScheduleRetry { timer: TimerId, delay: Duration },
    CancelRetry { timer: TimerId },
    /// Replace the published telemetry snapshot.
    Publish(TelemetrySnapshot),
}

pub struct ConnectionManager {
    max_attempts: u32,
    backoff: BackoffPolicy,
    construction_retry_delay: Duration,
    observer: Arc<dyn ChannelObserver>,

    state: ConnectionState,
    generation: Generation,
    socket: Option<Generation>,
    socket_started: bool,
    reconnect_attempts: u32,
    pending_timer: Option<TimerId>,
    next_timer: u64,
    intentional_close: bool,
    shut_down: bool,
}

impl ConnectionManager {
    pub fn new(config: &ChannelConfig, observer: Arc<dyn ChannelObserver>) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            backoff: config.backoff,
            construction_retry_delay: config.construction_retry_delay(),
            observer,
            state: ConnectionState::Disconnected,
            generation: Generation::default(),
            socket: None,
            socket_started: false,
            reconnect_attempts: 0,
            pending_timer: None,
            next_timer: 0,
            intentional_close: false,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    /// Generation of the socket currently held, if any.
    pub fn current_socket(&self) -> Option<Generation> {
        self.socket
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.shut_down {
            match event {
                Event::Send(command) => self.observer.send_dropped(&command, "channel shut down"),
                Event::ConnectRequested | Event::ReconnectRequested => {
                    self.observer.connect_ignored(IgnoredConnect::ShutDown)
                }
                _ => {}
            }
            return actions;
        }

        match event {
            Event::ConnectRequested => self.connect(&mut actions),
            Event::ReconnectRequested => {
                if !self.state.is_active() && self.socket.is_none() {
                    self.reconnect_attempts = 0;
                }
                self.connect(&mut actions);
            }
            Event::RetryElapsed { timer } => {
                if self.pending_timer == Some(timer) {
                    self.pending_timer = None;
                    self.connect(&mut actions);
                }
            }
            Event::OpenStarted { generation } => {
                if self.is_current(generation) && !self.socket_started {
                    self.socket_started = true;
                    self.set_state(ConnectionState::Connecting);
                }
            }
            Event::OpenFailed { generation, reason } => {
                if self.is_current(generation) && !self.socket_started {
                    self.socket = None;
                    self.observer.open_failed(generation, &reason);
                    self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                    self.schedule_retry(self.construction_retry_delay, &mut actions);
                }
            }
            Event::Opened { generation } => {
                if self.is_current(generation) && self.state == ConnectionState::Connecting {
                    self.reconnect_attempts = 0;
                    self.intentional_close = false;
                    self.set_state(ConnectionState::Connected);
                }
            }
            Event::Frame { generation, text } => {
                if self.is_current(generation) {
                    self.decode(&text, &mut actions);
                }
            }
            Event::BinaryFrame { generation, len } => {
                if self.is_current(generation) {
                    self.observer
                        .frame_discarded(&format!("unexpected binary frame ({len} bytes)"));
                }
            }
            Event::TransportError { generation, reason } => {
                // The close that follows is what schedules the retry.
                if self.is_current(generation) {
                    self.observer.transport_error(generation, &reason);
                }
            }
            Event::Closed {
                generation,
                code,
                reason,
            } => {
                if self.is_current(generation) {
                    self.closed(generation, code, &reason, &mut actions);
                }
            }
            Event::Send(command) => self.send(command, &mut actions),
            Event::Shutdown => self.shutdown(&mut actions),
        }

        actions
    }

    fn is_current(&self, generation: Generation) -> bool {
        let current = self.socket == Some(generation);
        if !current {
            self.observer.stale_event(generation);
        }
        current
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            let previous = std::mem::replace(&mut self.state, next);
            self.observer.state_changed(previous, next);
        }
    }

    fn connect(&mut self, actions: &mut Vec<Action>) {
        if self.state.is_active() || self.socket.is_some() {
            self.observer
                .connect_ignored(IgnoredConnect::AlreadyActive(self.state));
            return;
        }
        if self.reconnect_attempts >= self.max_attempts {
            self.observer.connect_ignored(IgnoredConnect::RetriesExhausted);
            return;
        }

        self.cancel_retry(actions);

        self.generation = self.generation.next();
        self.socket = Some(self.generation);
        self.socket_started = false;
        self.observer
            .connect_attempt(self.generation, self.reconnect_attempts + 1);
        actions.push(Action::Open {
            generation: self.generation,
        });
    }

    fn closed(
        &mut self,
        generation: Generation,
        code: Option<u16>,
        reason: &str,
        actions: &mut Vec<Action>,
    ) {
        self.socket = None;
        self.socket_started = false;
        self.set_state(ConnectionState::Disconnected);
        self.observer
            .closed(generation, code, reason, self.intentional_close);

        if self.intentional_close {
            return;
        }

        self.cancel_retry(actions);
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        let delay = self.backoff.delay_for(self.reconnect_attempts);
        self.schedule_retry(delay, actions);
    }

    fn schedule_retry(&mut self, delay: Duration, actions: &mut Vec<Action>) {
        if self.reconnect_attempts >= self.max_attempts {
            self.observer.retries_exhausted(self.reconnect_attempts);
            return;
        }

        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending_timer = Some(timer);
        self.observer.retry_scheduled(self.reconnect_attempts, delay);
        actions.push(Action::ScheduleRetry { timer, delay });
    }

    fn cancel_retry(&mut self, actions: &mut Vec<Action>) {
        if let Some(timer) = self.pending_timer.take() {
            actions.push(Action::CancelRetry { timer });
        }
    }

    fn decode(&mut self, text: &str, actions: &mut Vec<Action>) {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::Telemetry { data }) => actions.push(Action::Publish(data)),
            Ok(ServerFrame::Other) => self.observer.frame_ignored(text),
            Err(e) => self.observer.frame_discarded(&e.to_string()),
        }
    }

    fn send(&mut self, command: Command, actions: &mut Vec<Action>) {
        let generation = match (self.state, self.socket) {
            (ConnectionState::Connected, Some(generation)) => generation,
            (state, _) => {
                self.observer
                    .send_dropped(&command, &format!("channel is {state}"));
                return;
            }
        };

        match ClientFrame::control(command.clone()).encode() {
            Ok(text) => {
                self.observer.control_sent(&command);
                actions.push(Action::Transmit { generation, text });
            }
            Err(e) => self.observer.send_dropped(&command, &e.to_string()),
        }
    }

    fn shutdown(&mut self, actions: &mut Vec<Action>) {
        self.intentional_close = true;
        self.shut_down = true;
        self.cancel_retry(actions);
        if let Some(generation) = self.socket.take() {
            actions.push(Action::Close {
                generation,
                code: NORMAL_CLOSURE,
                reason: "client shutdown".to_string(),
            });
        }
        self.socket_started = false;
        self.set_state(ConnectionState::Disconnected);
    }
}
