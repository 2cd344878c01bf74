//! Error taxonomy for the client transport.
//!
//! Two audiences: callers of the public API get [`TransportError`] back
//! synchronously for misuse. Everything that goes wrong on the wire is
//! resolved inside the tick and reported as a classified value
//! ([`DisconnectReason`], [`ConnectError`]) inside a lifecycle event.

use std::fmt;
use std::io;

use crate::framing::FrameError;

/// Misuse of the transport API, returned immediately to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `connect` or `send` was called before `init`.
    #[error("transport endpoint not initialized; call init() first")]
    NotInitialized,

    /// `init` was called on a transport that already has an endpoint.
    #[error("transport endpoint already initialized")]
    AlreadyInitialized,

    /// The endpoint could not be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A protocol violation stopped the transport; `init` must be called again.
    #[error("transport stopped after a protocol violation; re-initialize to continue")]
    Stopped,

    /// The message cannot be framed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The connection manager behind this handle no longer exists.
    #[error("connection manager has been dropped")]
    ManagerGone,
}

/// Coarse class of a transport failure. Decides what the manager does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Corrupt or over-limit framing. The transport stops until re-initialized.
    ProtocolFatal,
    /// A connect attempt failed. Retried automatically within the budget.
    ConnectFailed,
    /// The peer closed the stream (zero-byte read or write).
    PeerClosed,
    /// The OS reported an error while sending or receiving.
    TransmitException,
    /// The application asked for the connection to be closed.
    ShutdownRequested,
}

impl ErrorClass {
    /// Whether this class stops the transport permanently.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::ProtocolFatal)
    }
}

/// Why an established connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the stream.
    PeerClosed,
    /// The OS reported an error on the socket.
    Transmit {
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
        /// Rendered error message.
        message: String,
    },
    /// The peer declared a frame larger than the configured maximum.
    FrameTooLarge {
        /// Declared payload length.
        size: u64,
        /// Configured maximum.
        max: u32,
    },
    /// Closed locally through `close(code)`.
    Shutdown {
        /// Application-supplied reason code.
        code: u32,
    },
}

impl DisconnectReason {
    /// Classify an I/O error observed on an established connection.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => DisconnectReason::PeerClosed,
            kind => DisconnectReason::Transmit {
                kind,
                message: err.to_string(),
            },
        }
    }

    /// Classify a framing failure on the receive path.
    pub fn from_frame_error(err: &FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => DisconnectReason::FrameTooLarge {
                size: *size,
                max: *max,
            },
            FrameError::ConnectionClosed => DisconnectReason::PeerClosed,
            FrameError::Io(e) => DisconnectReason::from_io(e),
        }
    }

    /// The error class of this disconnect.
    pub fn class(&self) -> ErrorClass {
        match self {
            DisconnectReason::PeerClosed => ErrorClass::PeerClosed,
            DisconnectReason::Transmit { .. } => ErrorClass::TransmitException,
            DisconnectReason::FrameTooLarge { .. } => ErrorClass::ProtocolFatal,
            DisconnectReason::Shutdown { .. } => ErrorClass::ShutdownRequested,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => write!(f, "peer closed the connection"),
            DisconnectReason::Transmit { kind, message } => {
                write!(f, "socket error ({kind:?}): {message}")
            }
            DisconnectReason::FrameTooLarge { size, max } => {
                write!(f, "peer declared a {size}-byte frame (max {max})")
            }
            DisconnectReason::Shutdown { code } => write!(f, "closed locally (code {code})"),
        }
    }
}

/// Why a connect attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
    /// Kind of the underlying I/O error.
    pub kind: io::ErrorKind,
    /// Rendered error message.
    pub message: String,
}

impl ConnectError {
    /// A connect that did not complete within the configured timeout.
    pub fn timed_out() -> Self {
        Self {
            kind: io::ErrorKind::TimedOut,
            message: "connect timed out".to_string(),
        }
    }

    /// Always [`ErrorClass::ConnectFailed`].
    pub fn class(&self) -> ErrorClass {
        ErrorClass::ConnectFailed
    }
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}
