//! Async frame I/O over a byte stream.
//!
//! - [`FramedReader`] turns the read half of a socket into a
//!   [`FrameSource`]: it reads exactly one 5-byte header, checks the declared
//!   length against the ceiling, then reads exactly that many payload bytes.
//!   Callers never see a partial frame.
//! - [`run_writer`] drains one connection's outbound queue into the write
//!   half of its socket, bounding every write with a timeout.
//!
//! # Why `read_exact`?
//!
//! Unlike a buffered decoder, `read_exact` simply waits until the requested
//! number of bytes has arrived.  If the peer closes the stream first it fails
//! with `UnexpectedEof`, which maps directly onto
//! [`FrameReadError::EndOfStream`].

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use nfc_relay_core::protocol::codec::FrameHeader;
use nfc_relay_core::protocol::INBOUND_HEADER_SIZE;
use nfc_relay_core::InboundFrame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::application::connection::{FrameReadError, FrameSource};
use crate::application::registry::OutboundFrame;

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads length-prefixed inbound frames from `R`.
pub struct FramedReader<R> {
    inner: R,
    max_frame_len: u32,
}

impl<R> FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R, max_frame_len: u32) -> Self {
        Self {
            inner,
            max_frame_len,
        }
    }

    async fn read_exactly(&mut self, buf: &mut [u8]) -> Result<(), FrameReadError> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(FrameReadError::EndOfStream),
            Err(e) => Err(FrameReadError::Io(e)),
        }
    }
}

#[async_trait]
impl<R> FrameSource for FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_frame(&mut self) -> Result<InboundFrame, FrameReadError> {
        let mut header_buf = [0u8; INBOUND_HEADER_SIZE];
        self.read_exactly(&mut header_buf).await?;

        let header = FrameHeader::parse(&header_buf)?;
        header.ensure_within(self.max_frame_len)?;

        let mut payload = vec![0u8; header.payload_len as usize];
        self.read_exactly(&mut payload).await?;

        Ok(InboundFrame {
            session: header.session,
            payload,
        })
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes every queued frame to `writer` until the queue closes or a write
/// fails.
///
/// The queue closes once the connection's handler has finished and the
/// registry has dropped its handle.  A write that does not complete within
/// `write_timeout` ends the writer; later broadcasts then see a closed queue
/// and skip this peer.
pub async fn run_writer<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<OutboundFrame>,
    write_timeout: Duration,
    origin: String,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        match timeout(write_timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(tag = "server", %origin, "write failed: {e}");
                return;
            }
            Err(_) => {
                warn!(tag = "server", %origin, "write timed out after {write_timeout:?}");
                return;
            }
        }
    }

    // Best effort: the peer may already be gone.
    let _ = writer.shutdown().await;
    debug!(tag = "server", %origin, "writer finished");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
