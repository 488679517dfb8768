//! The byte stream underneath an RCON connection.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Result};

/// How much spare capacity to make room for before each read.
const READ_CHUNK: usize = 4096;

/// The byte stream an RCON connection runs over.
///
/// Nothing here knows about packets: a single [`receive`](Transport::receive)
/// may yield part of a packet, or several packets at once.
#[async_trait]
pub trait Transport: Send {
    /// Write all of `bytes` to the stream.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Append whatever is available on the stream to `buffer`.
    /// Returns the number of bytes read, `0` meaning the peer closed the stream.
    async fn receive(&mut self, buffer: &mut BytesMut) -> Result<usize>;

    /// Shut down the stream.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T> Transport for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes).await?;
        self.flush().await
    }

    async fn receive(&mut self, buffer: &mut BytesMut) -> Result<usize> {
        buffer.reserve(READ_CHUNK);
        self.read_buf(buffer).await
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::Transport;
    use bytes::BytesMut;
    use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_receive_appends() -> io::Result<()> {
        let (mut client, mut server) = io::duplex(64);
        server.write_all(b"abc").await?;

        let mut buffer = BytesMut::from(&b"xy"[..]);
        let read = client.receive(&mut buffer).await?;

        assert_eq!(read, 3);
        assert_eq!(&buffer[..], b"xyabc");

        Ok(())
    }

    #[tokio::test]
    async fn test_close_is_seen_as_eof() -> io::Result<()> {
        let (mut client, mut server) = io::duplex(64);
        client.send(b"hi").await?;
        Transport::close(&mut client).await?;

        let mut received = Vec::new();
        server.read_to_end(&mut received).await?;
        assert_eq!(received, b"hi");

        Ok(())
    }
}
