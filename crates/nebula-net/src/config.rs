//! Runtime transport settings.

use std::time::Duration;

use nebula_config::NetworkConfig;

use crate::framing::FrameConfig;
use crate::reconnection::ReconnectConfig;
use crate::socket::SocketConfig;

/// Everything a [`ConnectionManager`](crate::ConnectionManager) needs to know,
/// with durations already resolved.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on one connect handshake. Default: 10 s.
    pub connect_timeout: Duration,
    /// Attempt budget used when a connect is triggered by `send`. Default: 3.
    pub max_connect_attempts: u32,
    /// Initial receive buffer size. Default: 64 KiB.
    pub inbound_buffer_capacity: usize,
    /// Frame size limit.
    pub frame: FrameConfig,
    /// Backoff between automatic connect retries.
    pub reconnect: ReconnectConfig,
    /// TCP options for each connected stream.
    pub socket: SocketConfig,
    /// Reply-wait threshold. `None` disables the watchdog. Default: 3 s.
    pub reply_wait_threshold: Option<Duration>,
    /// Send queue length that triggers a warning. Default: 1024.
    pub queue_warn_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_connect_attempts: 3,
            inbound_buffer_capacity: 64 * 1024,
            frame: FrameConfig::default(),
            reconnect: ReconnectConfig::default(),
            socket: SocketConfig::default(),
            reply_wait_threshold: Some(Duration::from_secs(3)),
            queue_warn_len: 1024,
        }
    }
}

impl From<&NetworkConfig> for TransportConfig {
    fn from(net: &NetworkConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(net.connect_timeout_ms),
            max_connect_attempts: net.max_connect_attempts,
            inbound_buffer_capacity: net.inbound_buffer_bytes,
            frame: FrameConfig {
                max_payload_size: net.max_frame_bytes,
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(net.retry_initial_delay_ms),
                backoff_multiplier: net.retry_backoff_multiplier,
                max_delay: Duration::from_millis(net.retry_max_delay_ms),
                jitter: net.retry_jitter,
            },
            socket: SocketConfig {
                tcp_nodelay: net.tcp_nodelay,
                keepalive_enabled: net.keepalive_enabled,
                keepalive_idle: Duration::from_secs(net.keepalive_idle_secs),
                ..SocketConfig::default()
            },
            reply_wait_threshold: (net.reply_wait_threshold_ms > 0)
                .then(|| Duration::from_millis(net.reply_wait_threshold_ms)),
            queue_warn_len: net.queue_warn_len,
        }
    }
}
