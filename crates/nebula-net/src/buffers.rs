//! Byte buffers sitting between the socket and the frame codec.
//!
//! [`OutboundBuffer`] holds the encoded frame of the message currently being
//! transmitted plus how much of it the OS has accepted, so a short write
//! resumes exactly where it stopped. [`InboundBuffer`] accumulates received
//! bytes until complete frames can be cut out of it.

use crate::framing::{FrameCodec, FrameError};

/// Smallest inbound capacity. Must hold at least a length prefix.
const MIN_INBOUND_CAPACITY: usize = 64;

/// Encoded bytes awaiting transmission.
///
/// Invariant: `committed <= data.len()`. Once every byte is committed both
/// reset to zero so the allocation is reused by the next frame.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    data: Vec<u8>,
    committed: usize,
}

impl OutboundBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `payload` into the buffer. Returns the frame size.
    ///
    /// Only called while the buffer is drained; a frame is never interleaved
    /// with another.
    pub fn load(&mut self, codec: &FrameCodec, payload: &[u8]) -> Result<usize, FrameError> {
        debug_assert!(self.is_empty(), "outbound frame loaded over unsent bytes");
        self.data.clear();
        self.committed = 0;
        codec.encode_into(payload, &mut self.data)?;
        Ok(self.data.len())
    }

    /// Bytes not yet accepted by the socket.
    pub fn unsent(&self) -> &[u8] {
        &self.data[self.committed..]
    }

    /// Whether any loaded bytes are still waiting to be written.
    pub fn has_unsent(&self) -> bool {
        self.committed < self.data.len()
    }

    /// Whether the buffer holds no frame at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes already accepted by the socket for the current frame.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Length of the current frame.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Record that the socket accepted `n` more bytes.
    ///
    /// Returns `true` when this completes the frame, at which point the
    /// buffer has already been reset.
    pub fn commit(&mut self, n: usize) -> bool {
        debug_assert!(n <= self.data.len() - self.committed);
        self.committed = (self.committed + n).min(self.data.len());
        if self.committed == self.data.len() {
            self.clear();
            true
        } else {
            false
        }
    }

    /// Drop any loaded frame, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.committed = 0;
    }
}

/// Receive-side accumulation buffer.
///
/// Fixed capacity that only grows when a single declared frame cannot fit.
/// Bytes of a partial frame are kept until the frame completes.
#[derive(Debug)]
pub struct InboundBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl InboundBuffer {
    /// Create a buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(MIN_INBOUND_CAPACITY)],
            filled: 0,
        }
    }

    /// Free region the next socket read should write into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Mark `n` bytes of the spare region as received.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.filled + n <= self.data.len());
        self.filled = (self.filled + n).min(self.data.len());
    }

    /// Bytes received but not yet consumed as frames.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Forget buffered bytes. The allocation is kept.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Cut every complete frame out of the buffer, in arrival order.
    ///
    /// `on_frame` is called once per payload. Trailing partial bytes are moved
    /// to the front. If the buffer is full and the pending frame is larger
    /// than the capacity, the buffer grows to fit exactly that frame.
    pub fn drain_frames(
        &mut self,
        codec: &FrameCodec,
        mut on_frame: impl FnMut(&[u8]),
    ) -> Result<usize, FrameError> {
        let mut cursor = 0;
        let mut frames = 0;
        while let Some((payload, consumed)) = codec.try_decode(&self.data[cursor..self.filled])? {
            on_frame(payload);
            cursor += consumed;
            frames += 1;
        }

        if cursor > 0 {
            self.data.copy_within(cursor..self.filled, 0);
            self.filled -= cursor;
        }

        if self.filled == self.data.len()
            && let Some(needed) = codec.frame_len(&self.data[..self.filled])?
            && needed > self.data.len()
        {
            tracing::debug!(
                "Growing inbound buffer from {} to {} bytes for a large frame",
                self.data.len(),
                needed
            );
            self.data.resize(needed, 0);
        }

        Ok(frames)
    }
}
