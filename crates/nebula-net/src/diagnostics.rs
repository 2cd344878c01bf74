//! Transport diagnostics: reply-wait watchdog and traffic counters.

use std::time::{Duration, Instant};

/// Edge reported by [`ReplyWatch`] on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySignal {
    /// The oldest outstanding request crossed the threshold.
    Delayed {
        /// How long it has been waiting.
        waited: Duration,
    },
    /// Traffic arrived after a delay was reported.
    Resumed,
}

/// Watches for requests that go unanswered for too long.
///
/// Armed when a request's frame has been fully written. Any inbound message
/// counts as the answer. Purely observational: it never changes connection
/// state.
#[derive(Debug, Clone)]
pub struct ReplyWatch {
    threshold: Option<Duration>,
    waiting_since: Option<Instant>,
    delayed: bool,
}

impl ReplyWatch {
    /// Create a watch. `None` disables it.
    pub fn new(threshold: Option<Duration>) -> Self {
        Self {
            threshold,
            waiting_since: None,
            delayed: false,
        }
    }

    /// A request finished transmitting at `now`. The oldest outstanding
    /// request keeps the clock.
    pub fn on_request_sent(&mut self, now: Instant) {
        if self.threshold.is_some() && self.waiting_since.is_none() {
            self.waiting_since = Some(now);
        }
    }

    /// An inbound message arrived.
    pub fn on_message(&mut self) -> Option<ReplySignal> {
        self.waiting_since = None;
        if std::mem::take(&mut self.delayed) {
            Some(ReplySignal::Resumed)
        } else {
            None
        }
    }

    /// Check the threshold. Reports `Delayed` once per wait.
    pub fn poll(&mut self, now: Instant) -> Option<ReplySignal> {
        let threshold = self.threshold?;
        let since = self.waiting_since?;
        let waited = now.saturating_duration_since(since);
        if !self.delayed && waited >= threshold {
            self.delayed = true;
            return Some(ReplySignal::Delayed { waited });
        }
        None
    }

    /// Forget any outstanding wait. Used on disconnect.
    pub fn reset(&mut self) {
        self.waiting_since = None;
        self.delayed = false;
    }

    /// Whether a request is awaiting any reply.
    pub fn is_waiting(&self) -> bool {
        self.waiting_since.is_some()
    }

    /// Whether a delay has been reported and not yet resolved.
    pub fn is_delayed(&self) -> bool {
        self.delayed
    }
}

/// Lifetime traffic counters of one [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes accepted by the socket (prefixes included).
    pub bytes_sent: u64,
    /// Bytes received from the socket.
    pub bytes_received: u64,
    /// Frames fully written.
    pub frames_sent: u64,
    /// Frames decoded.
    pub frames_received: u64,
    /// Connect attempts started.
    pub connect_attempts: u64,
    /// Successful connects.
    pub connects: u64,
    /// Established connections that ended.
    pub disconnects: u64,
}

impl TransportStats {
    /// Record `n` bytes accepted by the socket.
    pub fn record_write(&mut self, n: usize) {
        self.bytes_sent += n as u64;
    }

    /// Record `n` bytes received.
    pub fn record_read(&mut self, n: usize) {
        self.bytes_received += n as u64;
    }
}
