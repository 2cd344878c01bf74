//! Length-prefixed framing for TCP streams.
//!
//! Every message on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The 4-byte length prefix encodes the payload size as a `u32` in little-endian
//! byte order. The length does **not** include the 4 prefix bytes themselves.
//! A length of 0 is a valid frame carrying an empty message.
//!
//! [`FrameCodec`] is the I/O-free half used by the client's tick loop.
//! [`read_frame`] and [`write_frame`] speak the same format over async streams
//! for peers that run on tokio (the demo echo server, tests).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default cap on a frame's payload: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_048_576;

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual (or declared) payload size.
        size: u64,
        /// The configured maximum.
        max: u32,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pure encoder/decoder for the wire framing.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(&FrameConfig::default())
    }
}

impl FrameCodec {
    /// Create a codec enforcing the given limits.
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
        }
    }

    /// Largest payload this codec will encode or accept.
    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    /// Reject payloads the peer would treat as a protocol violation.
    pub fn check_payload(&self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() as u64 > u64::from(self.max_payload_size) {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len() as u64,
                max: self.max_payload_size,
            });
        }
        Ok(())
    }

    /// Encode `payload` into a freshly allocated frame.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        self.encode_into(payload, &mut out)?;
        Ok(out)
    }

    /// Append the frame for `payload` to `out`.
    pub fn encode_into(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
        self.check_payload(payload)?;
        out.reserve(LENGTH_PREFIX_LEN + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        Ok(())
    }

    /// Total size (prefix included) of the frame starting at `buf[0]`.
    ///
    /// Returns `Ok(None)` until the whole prefix is available. An over-limit
    /// length is reported as soon as the prefix is readable.
    pub fn frame_len(&self, buf: &[u8]) -> Result<Option<usize>, FrameError> {
        let Some(prefix) = buf.first_chunk::<LENGTH_PREFIX_LEN>() else {
            return Ok(None);
        };
        let payload_len = u32::from_le_bytes(*prefix);
        if payload_len > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: u64::from(payload_len),
                max: self.max_payload_size,
            });
        }
        Ok(Some(LENGTH_PREFIX_LEN + payload_len as usize))
    }

    /// Try to decode one frame from the start of `buf`.
    ///
    /// Returns the payload slice and the number of bytes consumed, or
    /// `Ok(None)` when `buf` does not yet hold a complete frame. Callers loop
    /// over the remaining bytes until `None` to drain every complete frame.
    pub fn try_decode<'a>(&self, buf: &'a [u8]) -> Result<Option<(&'a [u8], usize)>, FrameError> {
        let Some(total) = self.frame_len(buf)? else {
            return Ok(None);
        };
        if buf.len() < total {
            return Ok(None);
        }
        Ok(Some((&buf[LENGTH_PREFIX_LEN..total], total)))
    }
}

/// Read a single length-prefixed frame from the stream.
///
/// Returns the payload bytes. Blocks until the full frame is available.
/// Returns [`FrameError::ConnectionClosed`] if the peer closes the connection
/// before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let payload_len = u32::from_le_bytes(len_buf);

    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: u64::from(payload_len),
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::ConnectionClosed
            } else {
                FrameError::Io(e)
            }
        })?;
    }

    Ok(payload)
}

/// Write a single length-prefixed frame to the stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let frame = FrameCodec::new(config).encode(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn codec_with_max(max: u32) -> FrameCodec {
        FrameCodec::new(&FrameConfig {
            max_payload_size: max,
        })
    }

    #[test]
    fn test_encode_layout_is_little_endian() {
        let frame = FrameCodec::default().encode(b"hello").unwrap();
        assert_eq!(&frame[..4], &5u32.to_le_bytes());
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn test_decode_returns_payload_and_consumed() {
        let codec = FrameCodec::default();
        for payload in [&b""[..], b"x", b"a somewhat longer payload"] {
            let frame = codec.encode(payload).unwrap();
            let (decoded, consumed) = codec.try_decode(&frame).unwrap().unwrap();
            assert_eq!(decoded, payload);
            assert_eq!(consumed, 4 + payload.len());
        }
    }

    #[test]
    fn test_max_sized_payload_accepted() {
        let codec = codec_with_max(64);
        let payload = vec![7u8; 64];
        let frame = codec.encode(&payload).unwrap();
        let (decoded, consumed) = codec.try_decode(&frame).unwrap().unwrap();
        assert_eq!(decoded, &payload[..]);
        assert_eq!(consumed, 68);
    }

    #[test]
    fn test_byte_at_a_time_never_yields_early() {
        let codec = FrameCodec::default();
        let frame = codec.encode(b"patience").unwrap();
        for end in 0..frame.len() {
            assert!(
                codec.try_decode(&frame[..end]).unwrap().is_none(),
                "frame must not decode with only {end} bytes"
            );
        }
        let (payload, consumed) = codec.try_decode(&frame).unwrap().unwrap();
        assert_eq!(payload, b"patience");
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_back_to_back_frames_drain_in_order() {
        let codec = FrameCodec::default();
        let mut buf = codec.encode(b"first").unwrap();
        codec.encode_into(b"second", &mut buf).unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        while let Some((payload, consumed)) = codec.try_decode(&buf[cursor..]).unwrap() {
            seen.push(payload.to_vec());
            cursor += consumed;
        }
        assert_eq!(seen, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(cursor, buf.len());
    }

    #[test]
    fn test_oversized_prefix_rejected_without_payload() {
        let codec = codec_with_max(16);
        // Only the prefix is present: rejection must not wait for the body.
        let prefix = u32::MAX.to_le_bytes();
        let result = codec.try_decode(&prefix);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max: 16 }) if size == u64::from(u32::MAX)
        ));
    }

    #[test]
    fn test_oversized_payload_rejected_on_encode() {
        let codec = codec_with_max(16);
        let result = codec.encode(&[0u8; 17]);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_frame_len_needs_full_prefix() {
        let codec = FrameCodec::default();
        assert_eq!(codec.frame_len(&[1, 0, 0]).unwrap(), None);
        assert_eq!(codec.frame_len(&[1, 0, 0, 0]).unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_single_message_roundtrip() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig::default();

        write_frame(&mut client, b"hello world", &config).await.unwrap();
        let received = read_frame(&mut server, &config).await.unwrap();
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn test_partial_read_resumes_correctly() {
        // duplex with a tiny buffer forces partial writes/reads
        let (mut client, mut server) = duplex(8);
        let config = FrameConfig::default();
        let payload = b"this message is larger than the buffer";

        let write_config = config.clone();
        let write_task = tokio::spawn(async move {
            write_frame(&mut client, payload, &write_config)
                .await
                .unwrap();
        });

        let received = read_frame(&mut server, &config).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_async_reader_matches_codec_output() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig::default();
        let frame = FrameCodec::new(&config).encode(b"from the tick loop").unwrap();

        client.write_all(&frame).await.unwrap();
        client.flush().await.unwrap();

        let received = read_frame(&mut server, &config).await.unwrap();
        assert_eq!(received, b"from the tick loop");
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_on_read() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig {
            max_payload_size: 16,
        };

        client.write_all(&1024u32.to_le_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_zero_length_message_handled() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig::default();

        write_frame(&mut client, &[], &config).await.unwrap();
        let received = read_frame(&mut server, &config).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_connection_closed_during_length_read() {
        let (client, mut server) = duplex(8192);
        drop(client);

        let result = read_frame(&mut server, &FrameConfig::default()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }
}
