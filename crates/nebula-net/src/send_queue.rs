//! FIFO of application messages waiting to be transmitted.
//!
//! The head message is the only one that may be serialized into the outbound
//! buffer, and it is only popped once its whole frame has been accepted by the
//! socket. The queue has no hard cap: producers are never refused, but every
//! time the length crosses the configured high-water mark a warning is logged
//! so unbounded growth shows up in the logs.

use std::collections::VecDeque;

/// One application message awaiting transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Opaque application payload.
    pub payload: Vec<u8>,
    /// Whether the sender is waiting on a reply to this message.
    pub expects_reply: bool,
}

impl OutboundMessage {
    /// A fire-and-forget message.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            expects_reply: false,
        }
    }

    /// A message whose sender expects the server to answer.
    pub fn request(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            expects_reply: true,
        }
    }
}

/// Ordered queue of not-yet-fully-transmitted messages.
#[derive(Debug)]
pub struct SendQueue {
    messages: VecDeque<OutboundMessage>,
    warn_len: usize,
    above_warn_len: bool,
}

impl SendQueue {
    /// Create a queue that warns once its length reaches `warn_len`.
    pub fn new(warn_len: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            warn_len,
            above_warn_len: false,
        }
    }

    /// Append a message at the tail.
    pub fn push(&mut self, message: OutboundMessage) {
        self.messages.push_back(message);
        if self.warn_len > 0 && self.messages.len() >= self.warn_len && !self.above_warn_len {
            self.above_warn_len = true;
            tracing::warn!(
                "Send queue holds {} messages (warn threshold {}); the connection is not keeping up",
                self.messages.len(),
                self.warn_len
            );
        }
    }

    /// The message currently being transmitted, if any.
    pub fn front(&self) -> Option<&OutboundMessage> {
        self.messages.front()
    }

    /// Remove the head once its frame has been fully written.
    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        let message = self.messages.pop_front();
        if self.messages.len() < self.warn_len {
            self.above_warn_len = false;
        }
        message
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every queued message, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.messages.len();
        self.messages.clear();
        self.above_warn_len = false;
        dropped
    }

    /// Whether the high-water warning is currently latched.
    pub fn is_above_warn_len(&self) -> bool {
        self.above_warn_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = SendQueue::new(0);
        for payload in [b"A", b"B", b"C"] {
            queue.push(OutboundMessage::new(payload.to_vec()));
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_front())
            .map(|m| m.payload)
            .collect();
        assert_eq!(order, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
    }

    #[test]
    fn test_front_does_not_remove() {
        let mut queue = SendQueue::new(0);
        queue.push(OutboundMessage::request(b"req".to_vec()));
        assert!(queue.front().unwrap().expects_reply);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_warn_latch_rearms_below_threshold() {
        let mut queue = SendQueue::new(2);
        queue.push(OutboundMessage::new(vec![1]));
        assert!(!queue.is_above_warn_len());
        queue.push(OutboundMessage::new(vec![2]));
        assert!(queue.is_above_warn_len());
        queue.push(OutboundMessage::new(vec![3]));
        assert!(queue.is_above_warn_len());

        queue.pop_front();
        queue.pop_front();
        assert!(!queue.is_above_warn_len());
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let mut queue = SendQueue::new(0);
        queue.push(OutboundMessage::new(vec![1]));
        queue.push(OutboundMessage::new(vec![2]));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
