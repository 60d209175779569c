//! HTTP and WebSocket client.
//!
//! [`Session`] keeps a connection alive across requests. The free functions here each
//! build a throwaway session on the [global](ClientConfig::global) configuration, so
//! independent calls never share a connection.
//!
//! ```no_run
//! use micro_wire::client;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), micro_wire::protocol::HttpError> {
//! let response = client::get(
//!     "http://example.com/search",
//!     vec![client::query("q", "rust"), client::timeout(Duration::from_secs(5))],
//! )
//! .await?;
//! println!("{}: {}", response.http_code(), response.text());
//! # Ok(())
//! # }
//! ```

mod config;
mod option;
mod session;

pub use config::{ClientConfig, ClientConfigBuilder, Resolve};
pub use option::{
    Body, RequestOption, authorization, basic_auth, body_file, body_kv, connection, content_type, header, query,
    referer, server, timeout, user_agent,
};
pub use session::Session;

use crate::connection::{ClientConn, MaybeTlsStream};
use crate::protocol::{HttpError, ParseError, RequestUrl, Response, Scheme};
use crate::ws::{WsConn, handshake};
use http::Method;
use tracing::debug;

pub async fn head(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().head(url, options).await
}

pub async fn options(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().options(url, options).await
}

pub async fn get(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().get(url, options).await
}

pub async fn post(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().post(url, options).await
}

pub async fn put(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().put(url, options).await
}

pub async fn delete(url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().delete(url, options).await
}

pub async fn post_body(url: &str, body: Body, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().post_body(url, body, options).await
}

pub async fn put_body(url: &str, body: Body, options: Vec<RequestOption>) -> Result<Response, HttpError> {
    Session::default().put_body(url, body, options).await
}

/// Opens a raw connection, e.g. to `tcp://host:port`. TLS is used for `https`/`wss`.
pub async fn connect(url: &str) -> Result<ClientConn, HttpError> {
    let url = RequestUrl::parse(url)?;
    Ok(ClientConn::connect(url.target, None, ClientConfig::global()).await?)
}

/// Connects to a `ws://` or `wss://` URL and performs the upgrade handshake.
///
/// `http`/`https` URLs are accepted and treated as their websocket counterparts. A
/// `Timeout` option bounds connecting plus the handshake.
pub async fn connect_ws(url: &str, options: Vec<RequestOption>) -> Result<WsConn<MaybeTlsStream>, HttpError> {
    let parsed = RequestUrl::parse(url)?;
    if parsed.target.scheme == Scheme::Tcp {
        return Err(ParseError::unsupported_scheme(parsed.target.scheme).into());
    }

    let config = ClientConfig::global();
    let mut request = session::build(Method::GET, url, options);
    config.apply_default_headers(request.headers_mut());
    let timeout = request.timeout();
    let server = request.server().map(str::to_string);

    let upgrade = async {
        let conn = ClientConn::connect(parsed.target.clone(), server, config).await?;
        Ok::<_, HttpError>(handshake(conn.into_conn(), &mut request).await?)
    };

    let ws = if timeout.is_zero() {
        upgrade.await?
    } else {
        match tokio::time::timeout(timeout, upgrade).await {
            Ok(result) => result?,
            Err(_) => return Err(HttpError::timeout(timeout)),
        }
    };

    debug!(url, "websocket connected");
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_raw_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"pong\n").await.unwrap();
        });

        let mut conn = connect(&format!("tcp://127.0.0.1:{port}")).await.unwrap();
        conn.conn().send(b"ping").await.unwrap();
        assert_eq!(conn.conn().read_line().await.unwrap().as_ref(), b"pong");
    }

    #[tokio::test]
    async fn test_free_get_uses_fresh_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 1024];
                let n = stream.read(&mut buf).await.unwrap();
                assert!(buf[..n].starts_with(b"GET /free HTTP/1.1\r\n"));
                stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nfree").await.unwrap();
            }
        });

        let url = format!("http://127.0.0.1:{port}/free");
        assert_eq!(get(&url, vec![]).await.unwrap().text(), "free");
        assert_eq!(get(&url, vec![]).await.unwrap().text(), "free");
    }

    #[tokio::test]
    async fn test_ws_rejects_tcp_urls() {
        let result = connect_ws("tcp://127.0.0.1:9", vec![]).await;
        assert!(matches!(result, Err(HttpError::Parse { .. })));
    }
}
