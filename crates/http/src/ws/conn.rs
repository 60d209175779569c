use crate::codec::{Frame, Role, WsCodec, WsType};
use crate::connection::{Conn, ConnReader, ConnWriter, Transport};
use crate::protocol::WsError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

/// One complete, reassembled data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsMessage {
    pub kind: WsType,
    pub payload: Bytes,
}

impl WsMessage {
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Sending half of a [`WsConn`]. Clones share the connection and its closed state.
pub struct WsSender<S> {
    writer: ConnWriter<S>,
    codec: WsCodec,
    closed: Arc<AtomicBool>,
}

impl<S: Transport> WsSender<S> {
    pub async fn send_frame(&self, frame: Frame) -> Result<(), WsError> {
        if self.is_closed() {
            return Err(WsError::Closed);
        }
        self.write_frame(frame).await
    }

    pub async fn send_text<T: Into<String>>(&self, text: T) -> Result<(), WsError> {
        self.send_frame(Frame::new(WsType::Text, text.into())).await
    }

    pub async fn send_binary<B: Into<Bytes>>(&self, data: B) -> Result<(), WsError> {
        self.send_frame(Frame::new(WsType::Binary, data)).await
    }

    pub async fn send_ping<B: Into<Bytes>>(&self, data: B) -> Result<(), WsError> {
        self.send_frame(Frame::new(WsType::Ping, data)).await
    }

    /// Sends a Close frame and shuts the connection down. Failures are ignored, the peer
    /// may already be gone. Only the first call has any effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.write_frame(Frame::new(WsType::Close, Bytes::new())).await {
            trace!(cause = %e, "close frame not delivered");
        }
        self.writer.close().await;
    }

    async fn write_frame(&self, frame: Frame) -> Result<(), WsError> {
        let mut codec = self.codec;
        let mut buf = BytesMut::with_capacity(frame.payload.len() + 14);
        codec.encode(frame, &mut buf)?;
        self.writer.send(&buf).await?;
        Ok(())
    }
}

impl<S> WsSender<S> {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || !self.writer.is_connected()
    }
}

impl<S> Clone for WsSender<S> {
    fn clone(&self) -> Self {
        Self { writer: self.writer.clone(), codec: self.codec, closed: Arc::clone(&self.closed) }
    }
}

impl<S> Debug for WsSender<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSender").field("role", &self.codec.role()).field("closed", &self.is_closed()).finish()
    }
}

/// A WebSocket connection. Receiving needs `&mut self`; sending can also happen through
/// any number of [`WsSender`] clones.
pub struct WsConn<S: Transport> {
    reader: ConnReader<S>,
    sender: WsSender<S>,
    codec: WsCodec,
}

impl<S: Transport> WsConn<S> {
    /// Wraps a connection whose upgrade handshake has already completed.
    pub fn new(conn: Conn<S>, role: Role) -> Self {
        let (reader, writer) = conn.into_parts();
        let codec = WsCodec::new(role);
        let sender = WsSender { writer, codec, closed: Arc::new(AtomicBool::new(false)) };
        Self { reader, sender, codec }
    }

    pub fn sender(&self) -> WsSender<S> {
        self.sender.clone()
    }

    pub fn role(&self) -> Role {
        self.codec.role()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Waits for the next data message.
    ///
    /// Pings are answered and pongs dropped without surfacing. Fragments are collected
    /// until a frame with FIN set; the message kind is the first non-continuation opcode
    /// seen. A Close frame from the peer is answered and reported as [`WsError::Closed`].
    pub async fn recv(&mut self) -> Result<WsMessage, WsError> {
        if self.sender.closed.load(Ordering::Acquire) {
            return Err(WsError::Closed);
        }

        let mut kind = None;
        let mut payload = BytesMut::new();
        loop {
            let frame = self.reader.decode(&mut self.codec).await?;
            match frame.kind {
                WsType::Close => {
                    debug!(role = ?self.role(), "peer closed websocket");
                    self.sender.close().await;
                    return Err(WsError::Closed);
                }
                WsType::Ping => {
                    self.sender.send_frame(Frame::new(WsType::Pong, frame.payload)).await?;
                    continue;
                }
                WsType::Pong => continue,
                WsType::Continue => {}
                data => {
                    kind.get_or_insert(data);
                }
            }

            payload.extend_from_slice(&frame.payload);
            if frame.fin
                && let Some(kind) = kind
            {
                return Ok(WsMessage { kind, payload: payload.freeze() });
            }
        }
    }

    pub async fn send_text<T: Into<String>>(&self, text: T) -> Result<(), WsError> {
        self.sender.send_text(text).await
    }

    pub async fn send_binary<B: Into<Bytes>>(&self, data: B) -> Result<(), WsError> {
        self.sender.send_binary(data).await
    }

    pub async fn send_ping<B: Into<Bytes>>(&self, data: B) -> Result<(), WsError> {
        self.sender.send_ping(data).await
    }

    pub async fn close(&self) {
        self.sender.close().await;
    }
}

impl<S: Transport> Debug for WsConn<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConn").field("sender", &self.sender).field("buffered", &self.reader.buffered()).finish()
    }
}

impl<S: Transport> Drop for WsConn<S> {
    fn drop(&mut self) {
        if self.sender.closed.load(Ordering::Acquire) {
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            let sender = self.sender.clone();
            handle.spawn(async move { sender.close().await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    fn pair() -> (WsConn<DuplexStream>, WsConn<DuplexStream>) {
        let (client_io, server_io) = duplex(256 * 1024);
        (WsConn::new(Conn::new(client_io), Role::Client), WsConn::new(Conn::new(server_io), Role::Server))
    }

    #[tokio::test]
    async fn test_text_both_ways() {
        let (mut client, mut server) = pair();

        client.send_text("ping me").await.unwrap();
        let message = server.recv().await.unwrap();
        assert_eq!(message.kind, WsType::Text);
        assert_eq!(message.as_text(), Some("ping me"));

        server.send_binary(vec![1u8, 2, 3]).await.unwrap();
        let message = client.recv().await.unwrap();
        assert_eq!(message.kind, WsType::Binary);
        assert_eq!(message.payload.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_ping_is_transparent() {
        let (mut client, mut server) = pair();

        client.send_ping("p").await.unwrap();
        client.send_text("after ping").await.unwrap();
        assert_eq!(server.recv().await.unwrap().as_text(), Some("after ping"));

        // the pong queued ahead of this message is skipped
        server.send_text("reply").await.unwrap();
        assert_eq!(client.recv().await.unwrap().as_text(), Some("reply"));
    }

    #[tokio::test]
    async fn test_fragments_are_joined() {
        let (client_io, server_io) = duplex(1024);
        let mut server = WsConn::new(Conn::new(server_io), Role::Server);
        let mut raw = client_io;

        raw.write_all(&[0x01, 0x03, b'h', b'e', b'l']).await.unwrap();
        raw.write_all(&[0x89, 0x00]).await.unwrap();
        raw.write_all(&[0x80, 0x02, b'l', b'o']).await.unwrap();

        let message = server.recv().await.unwrap();
        assert_eq!(message.kind, WsType::Text);
        assert_eq!(message.as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_leading_continuation_takes_next_kind() {
        let (client_io, server_io) = duplex(1024);
        let mut server = WsConn::new(Conn::new(server_io), Role::Server);
        let mut raw = client_io;

        raw.write_all(&[0x00, 0x02, 0xAB, 0xCD]).await.unwrap();
        raw.write_all(&[0x82, 0x01, 0xEF]).await.unwrap();

        let message = server.recv().await.unwrap();
        assert_eq!(message.kind, WsType::Binary);
        assert_eq!(message.payload.as_ref(), &[0xAB, 0xCD, 0xEF]);
    }

    #[tokio::test]
    async fn test_close_ends_receiving() {
        let (mut client, mut server) = pair();

        client.close().await;
        assert!(matches!(server.recv().await, Err(WsError::Closed)));
        assert!(server.is_closed());
        assert!(matches!(client.send_text("late").await, Err(WsError::Closed)));
        assert!(matches!(client.recv().await, Err(WsError::Closed)));
    }

    #[tokio::test]
    async fn test_drop_sends_close() {
        let (client, mut server) = pair();
        drop(client);
        assert!(matches!(server.recv().await, Err(WsError::Closed)));
    }

    #[tokio::test]
    async fn test_sender_from_another_task() {
        let (mut client, server) = pair();
        let sender = server.sender();

        let task = tokio::spawn(async move { sender.send_text("from task").await });
        task.await.unwrap().unwrap();
        assert_eq!(client.recv().await.unwrap().as_text(), Some("from task"));
    }
}
