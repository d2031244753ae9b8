//! Framed record codec
//!
//! The validating node writes ledger-close metadata as a stream of framed
//! records over a byte pipe: a 4-byte big-endian length prefix followed by
//! the bincode payload. The same framing is used for archived metadata
//! files, so replay and live tracking share one decoder.

use crate::error::{MetaError, Result};
use crate::meta::LedgerCloseMeta;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard upper bound on a single frame. A ledger with a full transaction set
/// stays well under this; anything larger indicates a corrupt stream.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads framed records from a byte stream
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a byte stream
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next raw frame payload
    ///
    /// Returns `Ok(None)` on a clean end-of-stream (the stream closed on a
    /// frame boundary). A stream that ends mid-frame is a
    /// [`MetaError::TruncatedFrame`].
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.inner.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(MetaError::TruncatedFrame);
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(MetaError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => MetaError::TruncatedFrame,
                _ => MetaError::Io(e),
            })?;

        Ok(Some(Bytes::from(payload)))
    }

    /// Read and decode the next ledger-close metadata record
    pub async fn next_meta(&mut self) -> Result<Option<LedgerCloseMeta>> {
        match self.next_frame().await? {
            Some(payload) => Ok(Some(LedgerCloseMeta::decode(&payload)?)),
            None => Ok(None),
        }
    }
}

/// Write one framed payload
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(MetaError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Encode and frame one metadata record
pub async fn write_meta<W: AsyncWrite + Unpin>(
    writer: &mut W,
    meta: &LedgerCloseMeta,
) -> Result<()> {
    let payload = meta.encode()?;
    write_frame(writer, &payload).await
}
