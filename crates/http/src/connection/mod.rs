//! Connection layer: byte streams with buffered, cancellable reads and writes.
//!
//! - [`Conn`] wraps any [`Transport`], split into [`ConnReader`] and [`ConnWriter`]
//! - [`MaybeTlsStream`] is the TCP or TLS-over-TCP transport used on the network
//! - [`ClientConn`] is an outbound connection that can [`reconnect`](ClientConn::reconnect)

mod client_conn;
mod conn;
mod stream;
mod tls;

pub use client_conn::ClientConn;
pub use conn::{Conn, ConnReader, ConnWriter};
pub use stream::{MaybeTlsStream, Transport};
pub use tls::VerifyFn;

pub(crate) use tls::client_tls_config;
