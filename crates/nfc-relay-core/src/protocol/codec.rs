//! Binary codec for relay frames.
//!
//! Wire format (all multi-byte integers are big-endian):
//!
//! ```text
//! client → relay:  [payload_len:4][session_id:1][payload:N]
//! relay → client:  [payload_len:4][payload:N]
//! ```
//!
//! The relay never echoes the session byte back: a receiving peer already
//! knows which session it joined.
//!
//! # Streaming (for beginners)
//!
//! TCP is a *stream* protocol, so a buffer may hold half a frame or several
//! frames back to back.  [`decode_frame`] therefore returns the number of
//! bytes it consumed, and reports [`ProtocolError::InsufficientData`] when
//! the buffer does not yet hold a complete frame.  The caller keeps reading
//! and tries again.
//!
//! A length prefix of up to 4 GiB would let a hostile client force a huge
//! allocation, so every declared length is checked against a ceiling before
//! any payload buffer is allocated.

use thiserror::Error;

use crate::domain::session::SessionId;

/// Size of the inbound header: 4-byte length + 1-byte session id.
pub const INBOUND_HEADER_SIZE: usize = 5;

/// Size of the outbound header: 4-byte length only.
pub const OUTBOUND_HEADER_SIZE: usize = 4;

/// Default ceiling for a single payload (16 MiB).
///
/// Captured APDU exchanges are a few hundred bytes; the ceiling only exists
/// to bound the allocation a forged length prefix can cause.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the header or the declared payload.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The declared (or supplied) payload length exceeds the ceiling.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: u32 },
}

/// The fixed-size header at the front of every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Number of payload bytes that follow the header.
    pub payload_len: u32,
    /// Session the sender declares for this frame.
    pub session: SessionId,
}

impl FrameHeader {
    /// Parses the 5-byte inbound header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] if fewer than
    /// [`INBOUND_HEADER_SIZE`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < INBOUND_HEADER_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: INBOUND_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let payload_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self {
            payload_len,
            session: SessionId::new(bytes[4]),
        })
    }

    /// Rejects headers whose declared length exceeds `max_len`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`].
    pub fn ensure_within(&self, max_len: u32) -> Result<(), ProtocolError> {
        if self.payload_len > max_len {
            return Err(ProtocolError::FrameTooLarge {
                len: self.payload_len as usize,
                max: max_len,
            });
        }
        Ok(())
    }
}

/// One decoded client → relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Session id declared in the header.
    pub session: SessionId,
    /// Raw payload bytes, exactly as many as the header declared.
    pub payload: Vec<u8>,
}

impl InboundFrame {
    /// Returns `true` when the header declared a zero-length payload, which
    /// clients use as a disconnect signal.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound frame from the beginning of `bytes`.
///
/// Returns the decoded frame and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if the header or payload is
///   incomplete.
/// - [`ProtocolError::FrameTooLarge`] if the declared length exceeds
///   `max_len`.
///
/// # Examples
///
/// ```rust
/// use nfc_relay_core::{decode_frame, encode_inbound, SessionId};
/// use nfc_relay_core::protocol::MAX_FRAME_LEN;
///
/// let bytes = encode_inbound(SessionId::new(3), &[0xCA, 0xFE]).unwrap();
/// let (frame, consumed) = decode_frame(&bytes, MAX_FRAME_LEN).unwrap();
/// assert_eq!(frame.session, SessionId::new(3));
/// assert_eq!(frame.payload, vec![0xCA, 0xFE]);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_frame(bytes: &[u8], max_len: u32) -> Result<(InboundFrame, usize), ProtocolError> {
    let header = FrameHeader::parse(bytes)?;
    header.ensure_within(max_len)?;

    let total = INBOUND_HEADER_SIZE + header.payload_len as usize;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let frame = InboundFrame {
        session: header.session,
        payload: bytes[INBOUND_HEADER_SIZE..total].to_vec(),
    };
    Ok((frame, total))
}

/// Encodes a relay → client frame: 4-byte big-endian length, then payload.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_LEN`].
pub fn encode_outbound(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = checked_len(payload)?;

    let mut buf = Vec::with_capacity(OUTBOUND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encodes a client → relay frame: 4-byte big-endian length, the session
/// byte, then payload.
///
/// The relay itself never sends this format; it exists for clients, test
/// harnesses and tooling that talk to the relay.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_LEN`].
pub fn encode_inbound(session: SessionId, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = checked_len(payload)?;

    let mut buf = Vec::with_capacity(INBOUND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.push(session.get());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn checked_len(payload: &[u8]) -> Result<u32, ProtocolError> {
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    // Bounded by MAX_FRAME_LEN above, so the cast cannot truncate.
    Ok(payload.len() as u32)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse_reads_big_endian_length_and_session() {
        // Arrange
        let bytes = [0x00, 0x00, 0x01, 0x02, 0x07];

        // Act
        let header = FrameHeader::parse(&bytes).unwrap();

        // Assert
        assert_eq!(header.payload_len, 0x0102);
        assert_eq!(header.session, SessionId::new(7));
    }

    #[test]
    fn test_header_parse_short_buffer_reports_insufficient_data() {
        let result = FrameHeader::parse(&[0x00, 0x00, 0x00, 0x02]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: 5,
                available: 4
            })
        );
    }

    #[test]
    fn test_decode_frame_consumes_header_plus_payload() {
        // Arrange: header declares 2 bytes, followed by a trailing byte from
        // the next frame that must not be consumed.
        let bytes = [0x00, 0x00, 0x00, 0x02, 0x07, 0x10, 0x20, 0xFF];

        // Act
        let (frame, consumed) = decode_frame(&bytes, MAX_FRAME_LEN).unwrap();

        // Assert
        assert_eq!(consumed, 7);
        assert_eq!(frame.session, SessionId::new(7));
        assert_eq!(frame.payload, vec![0x10, 0x20]);
    }

    #[test]
    fn test_decode_frame_partial_payload_reports_insufficient_data() {
        let bytes = [0x00, 0x00, 0x00, 0x04, 0x01, 0xAA, 0xBB];
        let result = decode_frame(&bytes, MAX_FRAME_LEN);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: 9,
                available: 7
            })
        );
    }

    #[test]
    fn test_decode_frame_zero_length_is_an_empty_frame() {
        let (frame, consumed) = decode_frame(&[0, 0, 0, 0, 9], MAX_FRAME_LEN).unwrap();
        assert!(frame.is_empty());
        assert_eq!(consumed, INBOUND_HEADER_SIZE);
    }

    #[test]
    fn test_decode_frame_rejects_length_above_ceiling_before_reading_payload() {
        // Arrange: only the header is present; the check must fire anyway.
        let bytes = [0x00, 0x00, 0x01, 0x00, 0x01];

        // Act
        let result = decode_frame(&bytes, 128);

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::FrameTooLarge { len: 256, max: 128 })
        );
    }

    #[test]
    fn test_encode_outbound_has_no_session_byte() {
        let bytes = encode_outbound(&[0x10, 0x20]).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x02, 0x10, 0x20]);
    }

    #[test]
    fn test_encode_outbound_empty_payload_is_just_a_zero_length() {
        assert_eq!(encode_outbound(&[]).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_inbound_places_session_after_length() {
        let bytes = encode_inbound(SessionId::new(0xAB), &[0x01]).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x01, 0xAB, 0x01]);
    }

    #[test]
    fn test_encode_outbound_rejects_oversized_payload() {
        let big = vec![0u8; MAX_FRAME_LEN as usize + 1];
        let err = encode_outbound(&big).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }
}
