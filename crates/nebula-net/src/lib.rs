//! Client TCP transport: length-prefixed framing, tick-driven connection
//! management with bounded connect retries, and lifecycle events.

pub mod buffers;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod framing;
pub mod reconnection;
pub mod send_queue;
pub mod socket;

pub use config::TransportConfig;
pub use connection::{ConnectionManager, ConnectionState, ConnectionStateWatch, TransportHandle};
pub use diagnostics::TransportStats;
pub use error::{ConnectError, DisconnectReason, ErrorClass, TransportError};
pub use events::{Dispatcher, TransportEvent};
pub use framing::{FrameCodec, FrameConfig, FrameError, read_frame, write_frame};
pub use reconnection::ReconnectConfig;
pub use send_queue::OutboundMessage;
pub use socket::{Connector, Endpoint, Socket, SocketConfig, TcpConnector};
