//! Lifecycle and message events delivered to the application.

use std::time::Duration;

use crate::error::{ConnectError, DisconnectReason};

/// Everything the application learns from the transport.
///
/// Exactly one event is emitted per state transition, in the order the
/// transitions happened. Inbound messages are emitted in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and ready for traffic.
    Connected,
    /// An established connection ended.
    Disconnected(DisconnectReason),
    /// A complete inbound message.
    Message(Vec<u8>),
    /// A connect attempt failed and another one is scheduled.
    ConnectAttemptFailed {
        /// 1-based number of the attempt that failed.
        attempt: u32,
        /// Attempt budget of the current connect request.
        max_attempts: u32,
        /// Why it failed.
        error: ConnectError,
    },
    /// The attempt budget is spent; no further automatic attempts will run.
    ConnectFailed {
        /// Attempts made.
        attempts: u32,
        /// Why the last attempt failed.
        error: ConnectError,
    },
    /// A request has waited longer than the configured threshold for any reply.
    ResponseDelayed {
        /// How long the oldest outstanding request has been waiting.
        waited: Duration,
    },
    /// Traffic arrived again after [`TransportEvent::ResponseDelayed`].
    ResponseResumed,
}

impl TransportEvent {
    /// Whether this is a connection lifecycle event rather than a message or
    /// an observational signal.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            TransportEvent::Connected
                | TransportEvent::Disconnected(_)
                | TransportEvent::ConnectAttemptFailed { .. }
                | TransportEvent::ConnectFailed { .. }
        )
    }
}

/// Consumer of transport events: the application's reaction logic.
pub trait Dispatcher {
    /// Handle one event.
    fn dispatch(&mut self, event: TransportEvent);
}

impl<F: FnMut(TransportEvent)> Dispatcher for F {
    fn dispatch(&mut self, event: TransportEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_dispatcher() {
        let mut seen = Vec::new();
        {
            let mut dispatcher = |event: TransportEvent| seen.push(event);
            dispatcher.dispatch(TransportEvent::Connected);
            dispatcher.dispatch(TransportEvent::Message(b"hi".to_vec()));
        }
        assert_eq!(
            seen,
            vec![
                TransportEvent::Connected,
                TransportEvent::Message(b"hi".to_vec())
            ]
        );
    }

    #[test]
    fn test_lifecycle_classification() {
        assert!(TransportEvent::Connected.is_lifecycle());
        assert!(TransportEvent::Disconnected(DisconnectReason::PeerClosed).is_lifecycle());
        assert!(!TransportEvent::Message(Vec::new()).is_lifecycle());
        assert!(!TransportEvent::ResponseResumed.is_lifecycle());
    }
}
