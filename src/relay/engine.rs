//! Relay Engine
//!
//! Pumps bytes between two duplex streams until either side reaches
//! end-of-stream or errors. Each direction has its own byte queue bounded by
//! `max_buf`: a side is only read while its outbound queue is below the
//! bound, and a queue is only written out while non-empty. Short writes
//! consume exactly the accepted bytes and keep the remainder queued.
//!
//! Termination is first-close-wins: as soon as one side closes cleanly or
//! fails, both directions come down and whatever is still queued for the
//! opposite direction is discarded. This is intentional, not a missing
//! drain. Bytes already read from the closing side before its end-of-stream
//! are still flushed to the peer, so a producer that writes and immediately
//! closes is delivered intact.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;

/// Byte counters and buffer high-water marks for one completed relay
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayStats {
    /// Bytes delivered from stream A to stream B
    pub bytes_a_to_b: u64,
    /// Bytes delivered from stream B to stream A
    pub bytes_b_to_a: u64,
    /// Largest amount ever queued in the A-to-B direction
    pub peak_buffered_a_to_b: usize,
    /// Largest amount ever queued in the B-to-A direction
    pub peak_buffered_b_to_a: usize,
}

impl RelayStats {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_a_to_b + self.bytes_b_to_a
    }
}

/// Which side delivered a clean end-of-stream
enum Eof {
    A,
    B,
}

/// Moves bytes between exactly two streams with bounded buffering
pub struct RelayEngine<A, B> {
    a: A,
    b: B,
    max_buf: usize,
}

impl<A, B> RelayEngine<A, B>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an engine over a stream pair with a per-direction buffer bound
    pub fn new(a: A, b: B, max_buf: usize) -> Self {
        debug_assert!(max_buf > 0);
        Self { a, b, max_buf }
    }

    /// Drive the relay to termination.
    ///
    /// Returns the transfer statistics on a clean close from either side, or
    /// the stream error that ended the session. Both streams have had their
    /// write sides shut down by the time this returns.
    pub async fn run(self) -> Result<RelayStats, SessionError> {
        let max_buf = self.max_buf;
        let (mut a_read, mut a_write) = tokio::io::split(self.a);
        let (mut b_read, mut b_write) = tokio::io::split(self.b);

        let mut atob = BytesMut::new();
        let mut btoa = BytesMut::new();
        let mut scratch_a = vec![0u8; max_buf];
        let mut scratch_b = vec![0u8; max_buf];
        let mut stats = RelayStats::default();

        let outcome: Result<Option<Eof>, std::io::Error> = loop {
            // Interest sets for this iteration: read only while below the
            // bound, write only while something is queued.
            let room_a = max_buf - atob.len();
            let room_b = max_buf - btoa.len();

            tokio::select! {
                res = a_read.read(&mut scratch_a[..room_a]), if room_a > 0 => match res {
                    // Clean end-of-stream on A ends the whole session
                    Ok(0) => break Ok(Some(Eof::A)),
                    Ok(n) => {
                        atob.extend_from_slice(&scratch_a[..n]);
                        stats.peak_buffered_a_to_b = stats.peak_buffered_a_to_b.max(atob.len());
                    }
                    Err(e) => break Err(e),
                },
                res = b_read.read(&mut scratch_b[..room_b]), if room_b > 0 => match res {
                    Ok(0) => break Ok(Some(Eof::B)),
                    Ok(n) => {
                        btoa.extend_from_slice(&scratch_b[..n]);
                        stats.peak_buffered_b_to_a = stats.peak_buffered_b_to_a.max(btoa.len());
                    }
                    Err(e) => break Err(e),
                },
                res = b_write.write(&atob), if !atob.is_empty() => match res {
                    // A write of zero with data pending means the peer is gone
                    Ok(0) => break Ok(None),
                    Ok(n) => {
                        atob.advance(n);
                        stats.bytes_a_to_b += n as u64;
                    }
                    Err(e) => break Err(e),
                },
                res = a_write.write(&btoa), if !btoa.is_empty() => match res {
                    Ok(0) => break Ok(None),
                    Ok(n) => {
                        btoa.advance(n);
                        stats.bytes_b_to_a += n as u64;
                    }
                    Err(e) => break Err(e),
                },
            }
        };

        // Bytes already read from the closing side still go out; the
        // opposite direction's queue is discarded (first-close-wins).
        match &outcome {
            Ok(Some(Eof::A)) if !atob.is_empty() => {
                if b_write.write_all(&atob).await.is_ok() {
                    stats.bytes_a_to_b += atob.len() as u64;
                }
            }
            Ok(Some(Eof::B)) if !btoa.is_empty() => {
                if a_write.write_all(&btoa).await.is_ok() {
                    stats.bytes_b_to_a += btoa.len() as u64;
                }
            }
            _ => {}
        }

        // Both directions come down together.
        let _ = b_write.shutdown().await;
        let _ = a_write.shutdown().await;

        outcome.map(|_| stats).map_err(SessionError::from)
    }
}
