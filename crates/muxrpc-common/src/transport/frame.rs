use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame payload size (100 MB), to bound allocation on a
/// hostile or corrupted length prefix.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. the peer closed the
/// connection on a frame boundary. A disconnect in the middle of a frame
/// is a `Connection` error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(RpcError::Connection(
                "connection closed mid-frame".to_string(),
            ));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(len, MAX_FRAME_SIZE));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| RpcError::Connection(format!("reading frame payload: {}", e)))?;
    Ok(Some(buf))
}

/// Writes one length-prefixed frame. Does not flush; callers flush once
/// per message so that a header+body pair hits the wire together.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(payload.len(), MAX_FRAME_SIZE));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}
