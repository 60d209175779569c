//! An asynchronous micro HTTP/1.1 and WebSocket wire layer.
//!
//! This crate provides the pieces an HTTP client or server is built from, on top of tokio:
//! byte-exact codecs, buffered cancellable connections, client sessions with connection
//! reuse, WebSocket framing and the small set of async primitives they share. The server
//! side dispatcher lives in the `micro-wire-web` crate.
//!
//! # Example
//!
//! ```no_run
//! use micro_wire::client::{self, Session};
//! use micro_wire::protocol::HttpError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HttpError> {
//!     let session = Session::default();
//!     let response = session
//!         .post("http://127.0.0.1:8080/login", vec![client::body_kv("user", "zava"), client::body_kv("pwd", "x")])
//!         .await?;
//!     println!("{} {}", response.http_code(), response.text());
//!
//!     let mut ws = client::connect_ws("ws://127.0.0.1:8080/echo", vec![]).await?;
//!     ws.send_text("hello").await?;
//!     let message = ws.recv().await?;
//!     println!("{:?}", message.as_text());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`sync`]: semaphore, mutex, cancel token and timer built on tokio wakeups
//! - [`connection`]: [`Conn`](connection::Conn) over any transport, TCP and TLS streams,
//!   outbound [`ClientConn`](connection::ClientConn)
//! - [`protocol`]: [`Request`](protocol::Request), [`Response`](protocol::Response), URLs
//!   and error types
//! - [`codec`]: `tokio_util` encoders and decoders for requests, responses and frames
//! - [`ws`]: [`WsConn`](ws::WsConn) and the upgrade handshake
//! - [`client`]: [`Session`](client::Session), request options and one-shot helpers
//!
//! # Error Handling
//!
//! Each layer has its own `thiserror` enum: [`protocol::ConnError`],
//! [`protocol::ParseError`], [`protocol::SendError`], [`protocol::WsError`] and
//! [`sync::SyncError`]. Client calls return [`protocol::HttpError`], which records the
//! phase that failed, including [`timeouts`](protocol::HttpError::Timeout).
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - Outgoing WebSocket messages are never fragmented
//! - Bodies are buffered whole, there is no streaming body API

pub mod client;
pub mod codec;
pub mod connection;
pub mod protocol;
pub mod sync;
pub mod ws;

mod utils;
