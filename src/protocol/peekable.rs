//! Peekable stream wrapper
//!
//! Protocol detection needs to look at the first bytes of a connection
//! without taking them away from the handshake that follows. Bytes pulled in
//! by [`PeekableStream::peek`] are kept in a buffer and replayed by the
//! `AsyncRead` implementation before anything else is read from the socket.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// A stream that supports look-ahead without consumption
#[derive(Debug)]
pub struct PeekableStream<S> {
    inner: S,
    buffer: BytesMut,
}

impl<S> PeekableStream<S> {
    /// Wrap a stream that has not been read from yet
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }

    /// Bytes peeked but not yet consumed by a reader
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Borrow the wrapped stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the stream, returning any bytes still pending replay
    pub fn into_inner(self) -> (S, Bytes) {
        (self.inner, self.buffer.freeze())
    }
}

impl<S: AsyncRead + Unpin> PeekableStream<S> {
    /// Look at the first `len` bytes of the stream
    ///
    /// Reads until at least `len` bytes are buffered or the peer closes its
    /// side. The returned slice is shorter than `len` only on EOF. Nothing is
    /// consumed: later reads see the same bytes again.
    pub async fn peek(&mut self, len: usize) -> io::Result<&[u8]> {
        while self.buffer.len() < len {
            self.buffer.reserve(len - self.buffer.len());
            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                break;
            }
        }
        let available = self.buffer.len().min(len);
        Ok(&self.buffer[..available])
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PeekableStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.buffer.is_empty() {
            let n = this.buffer.len().min(buf.remaining());
            buf.put_slice(&this.buffer[..n]);
            this.buffer.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PeekableStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"GET /chat HTTP/1.1\r\n").await.unwrap();

        let mut stream = PeekableStream::new(server);
        assert_eq!(stream.peek(4).await.unwrap(), b"GET ");
        // peeking again returns the same bytes
        assert_eq!(stream.peek(3).await.unwrap(), b"GET");

        let mut line = vec![0u8; 20];
        stream.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"GET /chat HTTP/1.1\r\n");
        assert!(stream.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_peek_across_partial_writes() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = PeekableStream::new(server);

        let writer = tokio::spawn(async move {
            client.write_all(b"G").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"ET /").await.unwrap();
            client
        });

        assert_eq!(stream.peek(4).await.unwrap(), b"GET ");
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peek_short_on_eof() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"GE").await.unwrap();
        drop(client);

        let mut stream = PeekableStream::new(server);
        assert_eq!(stream.peek(4).await.unwrap(), b"GE");

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"GE");
    }

    #[tokio::test]
    async fn test_small_reads_drain_buffer() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"abcdef").await.unwrap();

        let mut stream = PeekableStream::new(server);
        stream.peek(6).await.unwrap();

        let mut two = [0u8; 2];
        stream.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"ab");
        assert_eq!(stream.buffered(), b"cdef");

        let (_, pending) = stream.into_inner();
        assert_eq!(&pending[..], b"cdef");
    }

    #[tokio::test]
    async fn test_writes_pass_through() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = PeekableStream::new(server);
        stream.write_all(b"pong").await.unwrap();
        stream.flush().await.unwrap();

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");
    }
}
