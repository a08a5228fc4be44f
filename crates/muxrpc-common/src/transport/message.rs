use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec::WireCodec;
use crate::protocol::error::{Result, RpcError};
use crate::protocol::{ConnectOptions, Header};
use crate::transport::frame::{read_frame, write_frame};

/// Reads header/body message pairs off one half of a connection.
///
/// A reader is exclusively owned by a single task (the client receive
/// loop, or the server pipeline loop), so none of its methods require
/// external locking.
pub struct MessageReader<R> {
    inner: R,
    codec: WireCodec,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R, codec: WireCodec) -> Self {
        MessageReader { inner, codec }
    }

    pub fn codec(&self) -> WireCodec {
        self.codec
    }

    /// Reads the next header. `Ok(None)` means the peer closed the
    /// stream cleanly between messages.
    pub async fn read_header(&mut self) -> Result<Option<Header>> {
        match read_frame(&mut self.inner).await? {
            Some(payload) => Ok(Some(self.codec.decode(&payload)?)),
            None => Ok(None),
        }
    }

    /// Reads the body following a header and decodes it.
    pub async fn read_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let payload = self.read_body_bytes().await?;
        self.codec.decode(&payload)
    }

    /// Reads the body following a header without decoding it.
    pub async fn read_body_bytes(&mut self) -> Result<Vec<u8>> {
        match read_frame(&mut self.inner).await? {
            Some(payload) => Ok(payload),
            None => Err(RpcError::Connection(
                "connection closed before message body".to_string(),
            )),
        }
    }

    /// Consumes and discards the body following a header, keeping the
    /// stream aligned on the next header frame.
    pub async fn skip_body(&mut self) -> Result<()> {
        self.read_body_bytes().await.map(|_| ())
    }
}

/// Writes header/body message pairs to one half of a connection.
///
/// Writers are not internally synchronized. Both sides of the protocol
/// guard theirs with a per-connection send lock so that the header and
/// body frames of one message are never interleaved with another's.
pub struct MessageWriter<W> {
    inner: W,
    codec: WireCodec,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W, codec: WireCodec) -> Self {
        MessageWriter { inner, codec }
    }

    pub fn codec(&self) -> WireCodec {
        self.codec
    }

    /// Writes one message: a header frame, a body frame, one flush.
    pub async fn write<B: Serialize>(&mut self, header: &Header, body: &B) -> Result<()> {
        let header_bytes = self.codec.encode(header)?;
        let body_bytes = self.codec.encode(body)?;
        self.write_raw(&header_bytes, &body_bytes).await
    }

    /// Writes one message whose body is already encoded.
    pub async fn write_body_bytes(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        let header_bytes = self.codec.encode(header)?;
        self.write_raw(&header_bytes, body).await
    }

    async fn write_raw(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        write_frame(&mut self.inner, header).await?;
        write_frame(&mut self.inner, body).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shuts down the underlying stream, signalling end-of-stream to the
    /// peer's reader.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Sends the handshake record. Always a JSON frame, independent of the
/// per-message codec, since the codec type is part of the payload.
pub async fn write_options<W>(writer: &mut W, options: &ConnectOptions) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(options).map_err(|e| RpcError::Encode(e.to_string()))?;
    write_frame(writer, &payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one handshake record.
pub async fn read_options<R>(reader: &mut R) -> Result<ConnectOptions>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader).await?.ok_or_else(|| {
        RpcError::Connection("connection closed before handshake".to_string())
    })?;
    serde_json::from_slice(&payload).map_err(|e| RpcError::Decode(e.to_string()))
}
