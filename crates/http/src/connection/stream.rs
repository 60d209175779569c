use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;

/// Byte stream a [`Conn`](super::Conn) can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pin_project! {
    /// A TCP stream, optionally wrapped in TLS.
    #[project = MaybeTlsProj]
    #[derive(Debug)]
    pub enum MaybeTlsStream {
        Plain { #[pin] stream: TcpStream },
        Tls { stream: Box<TlsStream<TcpStream>> },
    }
}

impl MaybeTlsStream {
    pub fn plain(stream: TcpStream) -> Self {
        Self::Plain { stream }
    }

    pub fn tls<S: Into<TlsStream<TcpStream>>>(stream: S) -> Self {
        Self::Tls { stream: Box::new(stream.into()) }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { stream } => stream.poll_read(cx, buf),
            MaybeTlsProj::Tls { stream } => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsProj::Plain { stream } => stream.poll_write(cx, buf),
            MaybeTlsProj::Tls { stream } => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { stream } => stream.poll_flush(cx),
            MaybeTlsProj::Tls { stream } => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { stream } => stream.poll_shutdown(cx),
            MaybeTlsProj::Tls { stream } => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
