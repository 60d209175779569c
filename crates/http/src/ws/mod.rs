//! WebSocket connections layered on an upgraded HTTP connection.
//!
//! A [`WsConn`] is created either on the server, by
//! [`Request::upgrade_websocket`](crate::protocol::Request::upgrade_websocket), or on the
//! client by [`handshake`] (usually through [`client::connect_ws`](crate::client::connect_ws)).

mod conn;
mod handshake;

pub use conn::{WsConn, WsMessage, WsSender};
pub use handshake::handshake;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` value for a `Sec-WebSocket-Key`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(accept_key(" dGhlIHNhbXBsZSBub25jZQ== "), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
