//! Tick-driven client connection to a Nebula game server.
//!
//! [`ConnectionManager`] owns the socket, the send queue, and both transport
//! buffers, and advances everything one step per [`ConnectionManager::update`].
//! Application threads talk to it through a cloneable [`TransportHandle`] that
//! only stages intents; the tick applies them in arrival order. Outcomes come
//! back as [`TransportEvent`]s, and state changes are mirrored into a
//! [`watch`] channel so any thread can observe them without polling.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use tokio::sync::watch;

use crate::buffers::{InboundBuffer, OutboundBuffer};
use crate::config::TransportConfig;
use crate::diagnostics::{ReplySignal, ReplyWatch, TransportStats};
use crate::error::{ConnectError, DisconnectReason, ErrorClass, TransportError};
use crate::events::{Dispatcher, TransportEvent};
use crate::framing::FrameCodec;
use crate::reconnection::{RetryDecision, RetryState};
use crate::send_queue::{OutboundMessage, SendQueue};
use crate::socket::{ConnectOutcome, Connector, Endpoint, Socket, TcpConnector};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// TCP connection established, ready for communication.
    Connected,
    /// Tearing the connection down. Entered and left within one teardown, so
    /// [`ConnectionManager::state`] never reports it after a tick returns. A
    /// watch subscriber on another thread may see it briefly.
    Closing,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
#[derive(Debug)]
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Intent staged by a [`TransportHandle`] for the next tick.
#[derive(Debug)]
enum Command {
    Send(OutboundMessage),
    Connect { max_attempts: u32 },
    Close { code: u32 },
}

#[derive(Debug, Default)]
struct TransportFlags {
    initialized: AtomicBool,
    stopped: AtomicBool,
}

/// Thread-safe entry point for application code.
///
/// Every method returns immediately. Usage errors are reported synchronously;
/// everything else is observed through events.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: Sender<Command>,
    flags: Arc<TransportFlags>,
    codec: FrameCodec,
    default_attempts: u32,
    state: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    /// Queue a message for transmission. Starts a connect if disconnected.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.stage_message(OutboundMessage::new(payload))
    }

    /// Queue a message the server is expected to answer. Arms the
    /// reply-wait watchdog once it is on the wire.
    pub fn request(&self, payload: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.stage_message(OutboundMessage::request(payload))
    }

    /// Ask for a connection with a fresh attempt budget. `None` uses the
    /// configured default. A no-op while connecting or connected.
    pub fn connect(&self, max_attempts: Option<u32>) -> Result<(), TransportError> {
        self.ensure_usable()?;
        let max_attempts = max_attempts.unwrap_or(self.default_attempts).max(1);
        self.stage(Command::Connect { max_attempts })
    }

    /// Close the connection, drop queued messages, and cancel retries.
    pub fn close(&self, code: u32) -> Result<(), TransportError> {
        self.stage(Command::Close { code })
    }

    /// Last state published by the tick.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether a protocol violation stopped the transport.
    pub fn is_stopped(&self) -> bool {
        self.flags.stopped.load(Ordering::Acquire)
    }

    fn stage_message(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.ensure_usable()?;
        self.codec.check_payload(&message.payload)?;
        self.stage(Command::Send(message))
    }

    fn ensure_usable(&self) -> Result<(), TransportError> {
        if self.flags.stopped.load(Ordering::Acquire) {
            return Err(TransportError::Stopped);
        }
        if !self.flags.initialized.load(Ordering::Acquire) {
            return Err(TransportError::NotInitialized);
        }
        Ok(())
    }

    fn stage(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::ManagerGone)
    }
}

struct PendingConnect<S> {
    outcome: Receiver<ConnectOutcome<S>>,
    started: Instant,
}

/// Single-threaded transport engine for one server connection.
pub struct ConnectionManager<C: Connector = TcpConnector> {
    config: TransportConfig,
    codec: FrameCodec,
    connector: C,
    endpoint: Option<Endpoint>,
    flags: Arc<TransportFlags>,
    state: ConnectionState,
    state_watch: Arc<ConnectionStateWatch>,
    socket: Option<C::Socket>,
    pending: Option<PendingConnect<C::Socket>>,
    retry: RetryState,
    connect_requested: bool,
    outbound: OutboundBuffer,
    inbound: InboundBuffer,
    queue: SendQueue,
    reply_watch: ReplyWatch,
    stats: TransportStats,
    handle: TransportHandle,
    commands: Receiver<Command>,
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
}

impl ConnectionManager<TcpConnector> {
    /// Create a manager that connects real TCP sockets.
    pub fn new(config: TransportConfig) -> Self {
        let connector = TcpConnector::new(config.socket.clone());
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager using a custom [`Connector`].
    pub fn with_connector(config: TransportConfig, connector: C) -> Self {
        let codec = FrameCodec::new(&config.frame);
        let flags = Arc::new(TransportFlags::default());
        let state_watch = Arc::new(ConnectionStateWatch::new());
        let (commands_tx, commands_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();

        let handle = TransportHandle {
            commands: commands_tx,
            flags: Arc::clone(&flags),
            codec,
            default_attempts: config.max_connect_attempts,
            state: state_watch.subscribe(),
        };

        Self {
            codec,
            connector,
            endpoint: None,
            flags,
            state: ConnectionState::Disconnected,
            state_watch,
            socket: None,
            pending: None,
            retry: RetryState::new(config.reconnect.clone(), config.max_connect_attempts),
            connect_requested: false,
            outbound: OutboundBuffer::new(),
            inbound: InboundBuffer::with_capacity(config.inbound_buffer_capacity),
            queue: SendQueue::new(config.queue_warn_len),
            reply_watch: ReplyWatch::new(config.reply_wait_threshold),
            stats: TransportStats::default(),
            handle,
            commands: commands_rx,
            events_tx,
            events_rx,
            config,
        }
    }

    /// Set the server endpoint.
    ///
    /// Allowed once, and again only after a protocol violation stopped the
    /// transport.
    pub fn init(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        let stopped = self.flags.stopped.load(Ordering::Acquire);
        if self.endpoint.is_some() && !stopped {
            return Err(TransportError::AlreadyInitialized);
        }
        let host = host.trim();
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint("host is empty".to_string()));
        }
        if port == 0 {
            return Err(TransportError::InvalidEndpoint("port is 0".to_string()));
        }

        let endpoint = Endpoint::new(host, port);
        tracing::info!("Transport endpoint set to {endpoint}");
        self.endpoint = Some(endpoint);
        self.retry.reset(self.config.max_connect_attempts);
        self.connect_requested = false;
        self.flags.initialized.store(true, Ordering::Release);
        self.flags.stopped.store(false, Ordering::Release);
        Ok(())
    }

    /// A new handle for application threads.
    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// See [`TransportHandle::connect`].
    pub fn connect(&self, max_attempts: Option<u32>) -> Result<(), TransportError> {
        self.handle.connect(max_attempts)
    }

    /// See [`TransportHandle::send`].
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.handle.send(payload)
    }

    /// See [`TransportHandle::request`].
    pub fn request(&self, payload: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.handle.request(payload)
    }

    /// See [`TransportHandle::close`].
    pub fn close(&self, code: u32) -> Result<(), TransportError> {
        self.handle.close(code)
    }

    /// Run one tick at the current time.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Run one tick as if the current time were `now`.
    ///
    /// Never blocks. Does at most one receive and one send.
    pub fn update_at(&mut self, now: Instant) {
        self.apply_commands();

        if self.state != ConnectionState::Connected {
            self.drive_connect(now);
            return;
        }
        if !self.check_socket_error() {
            return;
        }
        if !self.receive() {
            return;
        }
        if !self.transmit(now) {
            return;
        }
        if let Some(ReplySignal::Delayed { waited }) = self.reply_watch.poll(now) {
            tracing::warn!("No reply from server for {waited:?}");
            self.emit(TransportEvent::ResponseDelayed { waited });
        }
    }

    /// Receiver for transport events. Every clone shares one stream.
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    /// Push all pending events into `dispatcher`. Returns how many were delivered.
    pub fn dispatch_events(&self, dispatcher: &mut impl Dispatcher) -> usize {
        let mut delivered = 0;
        for event in self.events_rx.try_iter() {
            dispatcher.dispatch(event);
            delivered += 1;
        }
        delivered
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Shared state watch for observers on other threads.
    pub fn state_watch(&self) -> Arc<ConnectionStateWatch> {
        Arc::clone(&self.state_watch)
    }

    /// Whether a protocol violation stopped the transport.
    pub fn is_stopped(&self) -> bool {
        self.flags.stopped.load(Ordering::Acquire)
    }

    /// Configured endpoint, once initialized.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Attempt bookkeeping of the current connect request.
    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Traffic counters.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Messages waiting to be fully transmitted.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Active settings.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // --- Intents ---

    fn apply_commands(&mut self) {
        let commands = self.commands.clone();
        let staged = commands.len();
        for command in commands.try_iter().take(staged) {
            match command {
                Command::Send(message) => self.enqueue(message),
                Command::Connect { max_attempts } => self.request_connect(max_attempts),
                Command::Close { code } => self.request_close(code),
            }
        }
    }

    fn enqueue(&mut self, message: OutboundMessage) {
        if self.is_stopped() {
            tracing::warn!("Dropping message staged before the transport stopped");
            return;
        }
        self.queue.push(message);
        if self.state == ConnectionState::Disconnected && !self.connect_requested {
            self.request_connect(self.config.max_connect_attempts);
        }
    }

    fn request_connect(&mut self, max_attempts: u32) {
        if self.is_stopped() {
            return;
        }
        if self.state != ConnectionState::Disconnected || self.pending.is_some() {
            tracing::debug!("Connect request ignored while {:?}", self.state);
            return;
        }
        self.retry.reset(max_attempts.max(1));
        self.connect_requested = true;
    }

    fn request_close(&mut self, code: u32) {
        self.connect_requested = false;
        self.retry.reset(self.retry.max_attempts());
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                self.teardown(DisconnectReason::Shutdown { code });
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                let dropped = self.queue.clear();
                self.inbound.clear();
                self.outbound.clear();
                if dropped > 0 {
                    tracing::info!("Close requested; dropped {dropped} queued messages");
                }
            }
        }
    }

    // --- Connect state machine ---

    fn drive_connect(&mut self, now: Instant) {
        if let Some(pending) = &self.pending {
            let outcome = match pending.outcome.try_recv() {
                Ok(result) => Some(result.map_err(ConnectError::from)),
                Err(TryRecvError::Empty)
                    if now.saturating_duration_since(pending.started)
                        >= self.config.connect_timeout =>
                {
                    Some(Err(ConnectError::timed_out()))
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(ConnectError::from(io::Error::other(
                    "connect worker exited without a result",
                )))),
            };
            if let Some(outcome) = outcome {
                // Dropping the receiver discards a stream that arrives too late.
                self.pending = None;
                match outcome {
                    Ok(socket) => self.on_connected(socket),
                    Err(error) => self.on_connect_failed(error, now),
                }
            }
            return;
        }

        if self.connect_requested && self.retry.is_due(now) {
            self.begin_attempt(now);
        }
    }

    fn begin_attempt(&mut self, now: Instant) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            self.connect_requested = false;
            return;
        };
        tracing::info!(
            "Connecting to {endpoint} (attempt {}/{})",
            self.retry.attempts_made() + 1,
            self.retry.max_attempts()
        );
        let outcome = self.connector.start(endpoint, self.config.connect_timeout);
        self.retry.record_attempt(now);
        self.stats.connect_attempts += 1;
        self.pending = Some(PendingConnect {
            outcome,
            started: now,
        });
        self.set_state(ConnectionState::Connecting);
    }

    fn on_connected(&mut self, socket: C::Socket) {
        self.socket = Some(socket);
        self.connect_requested = false;
        self.retry.reset(self.retry.max_attempts());
        self.inbound.clear();
        self.outbound.clear();
        self.reply_watch.reset();
        self.stats.connects += 1;
        self.set_state(ConnectionState::Connected);
        if let Some(endpoint) = &self.endpoint {
            tracing::info!("Connected to {endpoint}");
        }
        self.emit(TransportEvent::Connected);
    }

    fn on_connect_failed(&mut self, error: ConnectError, now: Instant) {
        self.set_state(ConnectionState::Disconnected);
        let max_attempts = self.retry.max_attempts();
        match self.retry.record_failure(now) {
            RetryDecision::Retry { delay } => {
                let attempt = self.retry.attempts_made();
                tracing::warn!(
                    "Connect attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}"
                );
                self.emit(TransportEvent::ConnectAttemptFailed {
                    attempt,
                    max_attempts,
                    error,
                });
            }
            RetryDecision::Exhausted => {
                let attempts = self.retry.attempts_made();
                tracing::error!("Failed to connect after {attempts} attempts: {error}");
                self.connect_requested = false;
                self.emit(TransportEvent::ConnectFailed { attempts, error });
            }
        }
    }

    // --- Connected tick steps ---

    /// Returns `false` if the connection was torn down.
    fn check_socket_error(&mut self) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };
        match socket.take_error() {
            Ok(None) => true,
            Ok(Some(err)) | Err(err) => {
                self.teardown(DisconnectReason::from_io(&err));
                false
            }
        }
    }

    /// Returns `false` if the connection was torn down.
    fn receive(&mut self) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        let spare = self.inbound.spare_mut();
        if spare.is_empty() {
            return true;
        }

        let n = match socket.read(spare) {
            Ok(0) => {
                self.teardown(DisconnectReason::PeerClosed);
                return false;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                return true;
            }
            Err(e) => {
                self.teardown(DisconnectReason::from_io(&e));
                return false;
            }
        };

        self.inbound.advance(n);
        self.stats.record_read(n);
        tracing::trace!("Received {n} bytes");

        let mut payloads = Vec::new();
        let drained = self
            .inbound
            .drain_frames(&self.codec, |payload| payloads.push(payload.to_vec()));

        // Frames ahead of a bad header were valid and are delivered first.
        for payload in payloads {
            self.deliver(payload);
        }

        match drained {
            Ok(_) => true,
            Err(err) => {
                let reason = DisconnectReason::from_frame_error(&err);
                tracing::error!("Protocol violation from server: {err}");
                self.teardown(reason);
                false
            }
        }
    }

    fn deliver(&mut self, payload: Vec<u8>) {
        self.stats.frames_received += 1;
        tracing::debug!("Received {}-byte message", payload.len());
        if let Some(ReplySignal::Resumed) = self.reply_watch.on_message() {
            tracing::info!("Server traffic resumed");
            self.emit(TransportEvent::ResponseResumed);
        }
        self.emit(TransportEvent::Message(payload));
    }

    /// Returns `false` if the connection was torn down.
    fn transmit(&mut self, now: Instant) -> bool {
        if self.outbound.is_empty() {
            let Some(head) = self.queue.front() else {
                return true;
            };
            if let Err(err) = self.outbound.load(&self.codec, &head.payload) {
                tracing::warn!("Dropping message that cannot be framed: {err}");
                self.queue.pop_front();
                return true;
            }
        }

        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        match socket.write(self.outbound.unsent()) {
            Ok(0) => {
                self.teardown(DisconnectReason::PeerClosed);
                false
            }
            Ok(n) => {
                self.stats.record_write(n);
                tracing::trace!("Sent {n} bytes");
                if self.outbound.commit(n)
                    && let Some(message) = self.queue.pop_front()
                {
                    self.stats.frames_sent += 1;
                    tracing::debug!("Sent {}-byte message", message.payload.len());
                    if message.expects_reply {
                        self.reply_watch.on_request_sent(now);
                    }
                }
                true
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => true,
            Err(e) => {
                self.teardown(DisconnectReason::from_io(&e));
                false
            }
        }
    }

    // --- Teardown ---

    fn teardown(&mut self, reason: DisconnectReason) {
        let was_connected = self.state == ConnectionState::Connected;
        self.set_state(ConnectionState::Closing);

        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.pending = None;
        self.connect_requested = false;
        self.inbound.clear();
        self.outbound.clear();
        let dropped = self.queue.clear();
        self.reply_watch.reset();
        if was_connected {
            self.stats.disconnects += 1;
        }
        self.set_state(ConnectionState::Disconnected);

        let class = reason.class();
        if class.is_fatal() {
            self.flags.stopped.store(true, Ordering::Release);
            tracing::error!("Transport stopped: {reason}; re-initialize to continue");
        } else if class == ErrorClass::ShutdownRequested {
            tracing::info!("Disconnected: {reason}");
        } else {
            tracing::warn!("Disconnected: {reason}");
        }
        if dropped > 0 {
            tracing::info!("Dropped {dropped} queued messages on disconnect");
        }
        self.emit(TransportEvent::Disconnected(reason));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.state_watch.set(state);
        }
    }

    fn emit(&self, event: TransportEvent) {
        // The manager holds a receiver itself, so this cannot fail.
        let _ = self.events_tx.send(event);
    }
}
