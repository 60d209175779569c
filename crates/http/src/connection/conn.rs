//! Buffered, cancellable connection over any [`Transport`].
//!
//! A [`Conn`] is split into a [`ConnReader`] that owns the unread-bytes buffer and a
//! cloneable [`ConnWriter`] that serializes writers behind a lock. Both halves share
//! one [`CancellationToken`]: cancelling it makes every pending and future read or
//! write on the connection fail with [`ConnError::Cancelled`].
//!
//! None of the read operations ever drop bytes beyond what they return, surplus
//! bytes stay buffered for the next read.

use crate::connection::Transport;
use crate::protocol::ConnError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::select;
use tokio::sync::Mutex;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const INIT_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Default)]
struct ConnState {
    closed: AtomicBool,
}

impl ConnState {
    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct Conn<S> {
    reader: ConnReader<S>,
    writer: ConnWriter<S>,
}

impl<S: Transport> Conn<S> {
    pub fn new(stream: S) -> Self {
        Self::with_canceller(stream, CancellationToken::new())
    }

    pub fn with_canceller(stream: S, canceller: CancellationToken) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let state = Arc::new(ConnState::default());
        let reader = ConnReader {
            io: read_half,
            unread: BytesMut::with_capacity(INIT_BUFFER_SIZE),
            canceller: canceller.clone(),
            state: Arc::clone(&state),
        };
        let writer = ConnWriter { io: Arc::new(Mutex::new(write_half)), canceller, state };
        Self { reader, writer }
    }

    pub fn reader(&mut self) -> &mut ConnReader<S> {
        &mut self.reader
    }

    pub fn writer(&self) -> &ConnWriter<S> {
        &self.writer
    }

    pub fn into_parts(self) -> (ConnReader<S>, ConnWriter<S>) {
        (self.reader, self.writer)
    }

    pub async fn send(&self, data: &[u8]) -> Result<(), ConnError> {
        self.writer.send(data).await
    }

    pub async fn read_line(&mut self) -> Result<Bytes, ConnError> {
        self.reader.read_line().await
    }

    pub async fn read_count(&mut self, count: usize) -> Result<Bytes, ConnError> {
        self.reader.read_count(count).await
    }

    pub async fn read_some(&mut self) -> Result<Bytes, ConnError> {
        self.reader.read_some().await
    }

    pub fn canceller(&self) -> CancellationToken {
        self.writer.canceller.clone()
    }

    /// Aborts every in-flight operation on this connection. Idempotent.
    pub fn cancel(&self) {
        self.writer.cancel();
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_connected()
    }

    pub async fn close(&self) {
        self.writer.close().await;
    }
}

impl<S> Debug for Conn<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("buffered", &self.reader.unread.len())
            .field("closed", &self.writer.state.is_closed())
            .field("cancelled", &self.writer.canceller.is_cancelled())
            .finish()
    }
}

/// Read half of a [`Conn`], holding the unread-bytes buffer.
pub struct ConnReader<S> {
    io: ReadHalf<S>,
    unread: BytesMut,
    canceller: CancellationToken,
    state: Arc<ConnState>,
}

impl<S: Transport> ConnReader<S> {
    /// Reads one `\n` terminated line, without the `\n` and an optional `\r` before it.
    ///
    /// Fails with [`ConnError::Closed`] if the stream ends before a line terminator.
    pub async fn read_line(&mut self) -> Result<Bytes, ConnError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.unread[scanned..].iter().position(|b| *b == b'\n') {
                let mut line = self.unread.split_to(scanned + pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line.freeze());
            }
            scanned = self.unread.len();
            self.fill().await?;
        }
    }

    /// Reads exactly `count` bytes.
    pub async fn read_count(&mut self, count: usize) -> Result<Bytes, ConnError> {
        while self.unread.len() < count {
            self.fill().await?;
        }
        Ok(self.unread.split_to(count).freeze())
    }

    /// Returns everything buffered, or the result of one fresh read when the buffer is empty.
    pub async fn read_some(&mut self) -> Result<Bytes, ConnError> {
        if self.unread.is_empty() {
            self.fill().await?;
        }
        Ok(self.unread.split().freeze())
    }

    /// Runs `decoder` over the buffer, reading more from the transport until it yields an item.
    pub async fn decode<D>(&mut self, decoder: &mut D) -> Result<D::Item, D::Error>
    where
        D: Decoder,
        D::Error: From<ConnError>,
    {
        loop {
            if let Some(item) = decoder.decode(&mut self.unread)? {
                return Ok(item);
            }
            self.fill().await?;
        }
    }

    /// Appends whatever the transport delivers next to the buffer, consuming nothing.
    ///
    /// Lets an idle owner notice that the peer went away while no read is pending.
    pub async fn read_more(&mut self) -> Result<usize, ConnError> {
        self.fill().await
    }

    pub fn buffered(&self) -> usize {
        self.unread.len()
    }

    async fn fill(&mut self) -> Result<usize, ConnError> {
        if self.unread.capacity() - self.unread.len() < INIT_BUFFER_SIZE / 2 {
            self.unread.reserve(INIT_BUFFER_SIZE);
        }

        let result = select! {
            biased;
            () = self.canceller.cancelled() => return Err(ConnError::Cancelled),
            result = self.io.read_buf(&mut self.unread) => result,
        };

        match result {
            Ok(0) => {
                trace!("peer closed the read side");
                self.state.mark_closed();
                Err(ConnError::Closed)
            }
            Ok(n) => {
                trace!(len = n, "filled read buffer");
                Ok(n)
            }
            Err(e) => {
                self.state.mark_closed();
                Err(e.into())
            }
        }
    }
}

impl<S> Debug for ConnReader<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnReader").field("buffered", &self.unread.len()).finish()
    }
}

/// Write half of a [`Conn`]. Clones share the same stream and serialize their sends.
pub struct ConnWriter<S> {
    io: Arc<Mutex<WriteHalf<S>>>,
    canceller: CancellationToken,
    state: Arc<ConnState>,
}

impl<S: Transport> ConnWriter<S> {
    /// Writes all of `data`. A zero-length write is reported as [`ConnError::Closed`].
    pub async fn send(&self, data: &[u8]) -> Result<(), ConnError> {
        if !self.is_connected() {
            return Err(ConnError::NotConnected);
        }

        let mut io = select! {
            biased;
            () = self.canceller.cancelled() => return Err(ConnError::Cancelled),
            io = self.io.lock() => io,
        };

        let mut written = 0;
        while written < data.len() {
            let result = select! {
                biased;
                () = self.canceller.cancelled() => return Err(ConnError::Cancelled),
                result = io.write(&data[written..]) => result,
            };
            match result {
                Ok(0) => {
                    self.state.mark_closed();
                    return Err(ConnError::Closed);
                }
                Ok(n) => written += n,
                Err(e) => {
                    self.state.mark_closed();
                    return Err(e.into());
                }
            }
        }

        let result = select! {
            biased;
            () = self.canceller.cancelled() => return Err(ConnError::Cancelled),
            result = io.flush() => result,
        };
        result.map_err(|e| {
            self.state.mark_closed();
            ConnError::from(e)
        })
    }

    /// Shuts down the write side. Errors are ignored, the peer may already be gone.
    pub async fn close(&self) {
        self.state.mark_closed();
        let mut io = self.io.lock().await;
        if let Err(e) = io.shutdown().await {
            trace!(cause = %e, "shutdown on close failed");
        }
    }
}

impl<S> ConnWriter<S> {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn is_connected(&self) -> bool {
        !self.state.is_closed() && !self.canceller.is_cancelled()
    }

    /// Whether both writers point at the same underlying stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.io, &other.io)
    }
}

impl<S> Clone for ConnWriter<S> {
    fn clone(&self) -> Self {
        Self { io: Arc::clone(&self.io), canceller: self.canceller.clone(), state: Arc::clone(&self.state) }
    }
}

impl<S> Debug for ConnWriter<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnWriter").field("connected", &self.is_connected()).finish()
    }
}
