//! The HTTP upgrade exchange on both ends of a WebSocket connection.

use crate::codec::{RequestEncoder, ResponseDecoder, ResponseEncoder, Role};
use crate::connection::{Conn, MaybeTlsStream, Transport};
use crate::protocol::{Request, Response, WsError};
use crate::utils::ensure;
use crate::ws::{WsConn, accept_key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use http::{HeaderValue, StatusCode, header};
use tokio_util::codec::Encoder;
use tracing::debug;

/// Runs the client side of the upgrade on `conn` and returns a client-role [`WsConn`].
///
/// The upgrade headers and a fresh random key are set on `request` before it is sent.
pub async fn handshake<S: Transport>(mut conn: Conn<S>, request: &mut Request) -> Result<WsConn<S>, WsError> {
    let key = STANDARD.encode(rand::random::<[u8; 16]>());
    let headers = request.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_str(&key).map_err(WsError::handshake)?);

    let mut buf = BytesMut::new();
    RequestEncoder.encode(&mut *request, &mut buf)?;
    conn.send(&buf).await?;

    let response = conn.reader().decode(&mut ResponseDecoder::for_method(request.method())).await?;
    ensure!(
        response.status() == Some(StatusCode::SWITCHING_PROTOCOLS),
        WsError::handshake(format!("expected status 101, got {}", response.http_code()))
    );
    let expected = accept_key(&key);
    ensure!(
        response.header(header::SEC_WEBSOCKET_ACCEPT) == Some(expected.as_str()),
        WsError::handshake("Sec-WebSocket-Accept does not match the key")
    );

    debug!(url = request.url(), "websocket handshake complete");
    Ok(WsConn::new(conn, Role::Client))
}

impl Request {
    /// Answers a WebSocket upgrade request with `101 Switching Protocols` and takes over
    /// the connection it arrived on.
    ///
    /// Fails with [`WsError::NotUpgrade`] if the request is not a valid upgrade request or
    /// was not lent its connection by the server.
    pub async fn upgrade_websocket(&mut self) -> Result<WsConn<MaybeTlsStream>, WsError> {
        ensure!(self.is_websocket(), WsError::NotUpgrade);
        let key = self.header(header::SEC_WEBSOCKET_KEY).unwrap_or_default().to_string();
        let conn = self.take_upgrade_conn().ok_or(WsError::NotUpgrade)?;

        let mut buf = BytesMut::new();
        ResponseEncoder::new().encode(Response::from_upgrade_websocket(&key), &mut buf)?;
        conn.send(&buf).await?;
        self.mark_upgraded();

        debug!(url = self.url(), "upgraded to websocket");
        Ok(WsConn::new(conn, Role::Server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RequestDecoder;
    use http::Method;
    use tokio::io::{DuplexStream, duplex};

    async fn serve_upgrade(mut conn: Conn<DuplexStream>, accept: Option<String>) -> WsConn<DuplexStream> {
        let request = conn.reader().decode(&mut RequestDecoder::new(80, false)).await.unwrap();
        assert!(request.is_websocket());
        assert_eq!(request.path(), "/chat");

        let key = request.header(header::SEC_WEBSOCKET_KEY).unwrap();
        let mut response = Response::from_upgrade_websocket(key);
        if let Some(accept) = accept {
            response.headers_mut().insert(header::SEC_WEBSOCKET_ACCEPT, HeaderValue::from_str(&accept).unwrap());
        }
        let mut buf = BytesMut::new();
        ResponseEncoder::new().encode(response, &mut buf).unwrap();
        conn.send(&buf).await.unwrap();
        WsConn::new(conn, Role::Server)
    }

    #[tokio::test]
    async fn test_handshake_then_messages() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server = tokio::spawn(serve_upgrade(Conn::new(server_io), None));

        let mut request = Request::new(Method::GET, "ws://example.test/chat");
        let mut client = handshake(Conn::new(client_io), &mut request).await.unwrap();
        let mut server = server.await.unwrap();

        client.send_text("hello").await.unwrap();
        assert_eq!(server.recv().await.unwrap().as_text(), Some("hello"));
        server.send_text("world").await.unwrap();
        assert_eq!(client.recv().await.unwrap().as_text(), Some("world"));
    }

    #[tokio::test]
    async fn test_wrong_accept_key() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server = tokio::spawn(serve_upgrade(Conn::new(server_io), Some("bogus".to_string())));

        let mut request = Request::new(Method::GET, "ws://example.test/chat");
        let result = handshake(Conn::new(client_io), &mut request).await;
        assert!(matches!(result, Err(WsError::Handshake { .. })));
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_upgrade_requires_websocket_request() {
        let mut request = Request::new(Method::GET, "http://example.test/chat");
        assert!(matches!(request.upgrade_websocket().await, Err(WsError::NotUpgrade)));
    }
}
