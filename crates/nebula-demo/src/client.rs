//! Fixed-rate client loop driving the transport against the echo server.

use std::time::{Duration, Instant};

use nebula_config::NetworkConfig;
use nebula_net::{
    ConnectionManager, DisconnectReason, Dispatcher, TransportConfig, TransportError,
    TransportEvent,
};
use tracing::{error, info, warn};

/// What the demo observed.
#[derive(Debug, Default)]
pub struct EchoReport {
    /// Echoes expected.
    pub expected: u32,
    /// Echoes received.
    pub received: u32,
    finished: bool,
}

impl EchoReport {
    fn new(expected: u32) -> Self {
        Self {
            expected,
            ..Default::default()
        }
    }

    /// Whether every message came back.
    pub fn all_echoed(&self) -> bool {
        self.received >= self.expected
    }
}

impl Dispatcher for EchoReport {
    fn dispatch(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("Connected");
                if self.expected == 0 {
                    self.finished = true;
                }
            }
            TransportEvent::Message(payload) => {
                self.received += 1;
                info!(
                    "Echo {}/{}: {}",
                    self.received,
                    self.expected,
                    String::from_utf8_lossy(&payload)
                );
                if self.all_echoed() {
                    self.finished = true;
                }
            }
            TransportEvent::ConnectAttemptFailed {
                attempt,
                max_attempts,
                error,
            } => warn!("Reconnecting ({attempt}/{max_attempts} failed: {error})"),
            TransportEvent::ConnectFailed { attempts, error } => {
                error!("Could not reach the server after {attempts} attempts: {error}");
                self.finished = true;
            }
            TransportEvent::Disconnected(DisconnectReason::Shutdown { .. }) => {}
            TransportEvent::Disconnected(reason) => {
                warn!("Connection lost: {reason}");
                self.finished = true;
            }
            TransportEvent::ResponseDelayed { waited } => {
                warn!("Server has not answered for {waited:?}");
            }
            TransportEvent::ResponseResumed => info!("Server answering again"),
        }
    }
}

/// Send `messages` requests and tick at `tick_hz` until they are all echoed
/// or the connection terminally fails.
pub fn run(network: &NetworkConfig, messages: u32, tick_hz: u32) -> Result<EchoReport, TransportError> {
    let mut manager = ConnectionManager::new(TransportConfig::from(network));
    manager.init(&network.server_address, network.server_port)?;

    let handle = manager.handle();
    handle.connect(None)?;
    for i in 0..messages {
        handle.request(format!("message {i}").into_bytes())?;
    }

    let tick = Duration::from_secs(1) / tick_hz.max(1);
    let mut report = EchoReport::new(messages);
    loop {
        let started = Instant::now();
        manager.update_at(started);
        manager.dispatch_events(&mut report);
        if report.finished {
            break;
        }
        std::thread::sleep(tick.saturating_sub(started.elapsed()));
    }

    handle.close(0)?;
    manager.update();
    let stats = manager.stats();
    info!(
        "Sent {} frames ({} bytes), received {} frames ({} bytes)",
        stats.frames_sent, stats.bytes_sent, stats.frames_received, stats.bytes_received
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_finishes_when_all_echoes_arrive() {
        let mut report = EchoReport::new(2);
        report.dispatch(TransportEvent::Connected);
        report.dispatch(TransportEvent::Message(b"a".to_vec()));
        assert!(!report.finished);
        report.dispatch(TransportEvent::Message(b"b".to_vec()));
        assert!(report.finished);
        assert!(report.all_echoed());
    }

    #[test]
    fn test_report_finishes_on_lost_connection() {
        let mut report = EchoReport::new(5);
        report.dispatch(TransportEvent::Disconnected(DisconnectReason::PeerClosed));
        assert!(report.finished);
        assert!(!report.all_echoed());
    }

    #[test]
    fn test_local_shutdown_is_not_a_failure() {
        let mut report = EchoReport::new(1);
        report.dispatch(TransportEvent::Disconnected(DisconnectReason::Shutdown { code: 0 }));
        assert!(!report.finished);
    }
}
