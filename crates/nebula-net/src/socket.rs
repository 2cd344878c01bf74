//! Socket layer: endpoint resolution, off-tick connect, and socket tuning.
//!
//! The tick loop talks to the network only through the [`Socket`] and
//! [`Connector`] traits. [`TcpConnector`] runs the blocking handshake on a
//! short-lived worker thread bounded by the connect timeout and hands the
//! configured, non-blocking [`TcpStream`] back over a channel.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded};
use socket2::{SockRef, TcpKeepalive};

/// Address of the game server. Set once through `init`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to socket addresses. Blocks on DNS; only called off the tick.
    pub fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Per-connection TCP options applied right after the handshake.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm for lower latency. Default: true.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive. Default: true.
    pub keepalive_enabled: bool,
    /// Idle time before the first keepalive probe. Default: 60s.
    pub keepalive_idle: Duration,
    /// Keepalive probe interval. Default: 10s.
    pub keepalive_interval: Duration,
    /// Number of keepalive probes before declaring connection dead. Default: 3.
    pub keepalive_retries: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive_enabled: true,
            keepalive_idle: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(10),
            keepalive_retries: 3,
        }
    }
}

/// Apply socket configuration to a connected [`TcpStream`] and make it
/// non-blocking.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    if config.keepalive_enabled {
        let sock_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(config.keepalive_idle)
            .with_interval(config.keepalive_interval);

        // Retries are supported on Linux and Windows but not macOS.
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        let keepalive = keepalive.with_retries(config.keepalive_retries);

        sock_ref.set_tcp_keepalive(&keepalive)?;
    }

    stream.set_nonblocking(true)
}

/// A connected, non-blocking byte stream.
///
/// `read` and `write` must return `WouldBlock` instead of blocking.
pub trait Socket: Read + Write {
    /// Take the pending socket error (`SO_ERROR`), if any, without blocking.
    fn take_error(&self) -> io::Result<Option<io::Error>>;

    /// Shut down both directions. Errors are not interesting at this point.
    fn close(&mut self);
}

impl Socket for TcpStream {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        TcpStream::take_error(self)
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Result of a connect attempt as seen by the tick.
pub type ConnectOutcome<S> = io::Result<S>;

/// Starts connect attempts without blocking the caller.
pub trait Connector {
    /// The socket type produced on success.
    type Socket: Socket;

    /// Begin connecting to `endpoint`.
    ///
    /// The returned channel yields exactly one outcome. It stays empty while
    /// the attempt is in flight; the tick polls it with `try_recv`.
    fn start(&mut self, endpoint: &Endpoint, timeout: Duration)
    -> Receiver<ConnectOutcome<Self::Socket>>;
}

/// Connects real TCP sockets on a worker thread.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: SocketConfig,
}

impl TcpConnector {
    /// Create a connector applying `config` to every stream it opens.
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    type Socket = TcpStream;

    fn start(&mut self, endpoint: &Endpoint, timeout: Duration) -> Receiver<io::Result<TcpStream>> {
        let (tx, rx) = bounded(1);
        let worker_tx = tx.clone();
        let endpoint = endpoint.clone();
        let config = self.config.clone();

        let spawned = std::thread::Builder::new()
            .name("nebula-net-connect".to_string())
            .spawn(move || {
                let outcome = connect_blocking(&endpoint, timeout, &config);
                // The tick may have given up already; the stream is then dropped.
                let _ = worker_tx.send(outcome);
            });

        if let Err(e) = spawned {
            let _ = tx.send(Err(e));
        }
        rx
    }
}

/// Resolve `endpoint` and try each address until one connects, all within
/// `timeout`.
pub fn connect_blocking(
    endpoint: &Endpoint,
    timeout: Duration,
    config: &SocketConfig,
) -> io::Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    let addrs = endpoint.resolve()?;
    let mut last_err = None;

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {endpoint} timed out"),
            ));
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => {
                configure_stream(&stream, config)?;
                tracing::debug!("TCP handshake with {addr} complete");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Connect to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{endpoint} resolved to no addresses"),
        )
    }))
}
