use crate::client::ClientConfig;
use crate::connection::{Conn, MaybeTlsStream};
use crate::protocol::{ConnError, Target};
use rustls::pki_types::ServerName;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::select;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// An outbound connection that remembers where it goes, so it can be re-established.
///
/// Connections accepted by a server are plain [`Conn`]s and have no `reconnect`.
#[derive(Debug)]
pub struct ClientConn {
    conn: Conn<MaybeTlsStream>,
    target: Target,
    server: Option<String>,
    config: Arc<ClientConfig>,
}

impl ClientConn {
    /// Resolves and connects to `target`, with a TLS handshake for `https`/`wss`.
    ///
    /// `server` is a literal address that replaces resolution of the target host.
    pub async fn connect(target: Target, server: Option<String>, config: Arc<ClientConfig>) -> Result<Self, ConnError> {
        let conn = open(&target, server.as_deref(), &config, CancellationToken::new()).await?;
        Ok(Self { conn, target, server, config })
    }

    /// Drops the current stream and connects again to the same target.
    pub async fn reconnect(&mut self) -> Result<(), ConnError> {
        self.conn.cancel();
        debug!(target = %self.target.flag(), "reconnecting");
        self.conn = open(&self.target, self.server.as_deref(), &self.config, CancellationToken::new()).await?;
        Ok(())
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn flag(&self) -> String {
        self.target.flag()
    }

    pub fn conn(&mut self) -> &mut Conn<MaybeTlsStream> {
        &mut self.conn
    }

    pub fn into_conn(self) -> Conn<MaybeTlsStream> {
        self.conn
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn cancel(&self) {
        self.conn.cancel();
    }
}

async fn open(
    target: &Target,
    server: Option<&str>,
    config: &ClientConfig,
    canceller: CancellationToken,
) -> Result<Conn<MaybeTlsStream>, ConnError> {
    let addrs = select! {
        biased;
        () = canceller.cancelled() => return Err(ConnError::Cancelled),
        addrs = resolve(target, server, config) => addrs?,
    };

    let tcp_stream = select! {
        biased;
        () = canceller.cancelled() => return Err(ConnError::Cancelled),
        stream = TcpStream::connect(addrs.as_slice()) => stream.map_err(|e| ConnError::connect(target.flag(), e))?,
    };
    if config.no_delay() {
        tcp_stream.set_nodelay(true)?;
    }
    trace!(target = %target.flag(), peer = ?tcp_stream.peer_addr().ok(), "tcp connected");

    let stream = if target.scheme.is_secure() {
        let connector = TlsConnector::from(config.tls_config()?);
        let server_name = ServerName::try_from(target.host.clone()).map_err(ConnError::tls)?;
        let tls_stream = select! {
            biased;
            () = canceller.cancelled() => return Err(ConnError::Cancelled),
            stream = connector.connect(server_name, tcp_stream) => stream.map_err(ConnError::tls)?,
        };
        MaybeTlsStream::tls(tls_stream)
    } else {
        MaybeTlsStream::plain(tcp_stream)
    };

    Ok(Conn::with_canceller(stream, canceller))
}

async fn resolve(target: &Target, server: Option<&str>, config: &ClientConfig) -> Result<Vec<SocketAddr>, ConnError> {
    let host = server.unwrap_or(&target.host);
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, target.port)]);
    }

    if let Some(resolver) = config.resolver()
        && let Some(ip) = resolver.resolve(host).await
    {
        trace!(host, %ip, "resolved by dns hook");
        return Ok(vec![SocketAddr::new(ip, target.port)]);
    }

    let addrs: Vec<SocketAddr> =
        tokio::net::lookup_host((host, target.port)).await.map_err(|e| ConnError::resolve(host, e))?.collect();
    if addrs.is_empty() {
        return Err(ConnError::resolve(host, "no address found"));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Scheme;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                stream.write_all(b"hi\n").await.unwrap();
            }
        });

        let target = Target { scheme: Scheme::Http, host: "127.0.0.1".to_string(), port };
        let mut conn = ClientConn::connect(target, None, Arc::new(ClientConfig::default())).await.unwrap();
        assert_eq!(conn.flag(), format!("http://127.0.0.1:{port}"));
        assert_eq!(conn.conn().read_line().await.unwrap().as_ref(), b"hi");

        conn.reconnect().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.conn().read_line().await.unwrap().as_ref(), b"hi");
    }

    #[tokio::test]
    async fn test_server_override_skips_dns() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let target = Target { scheme: Scheme::Http, host: "unresolvable.invalid".to_string(), port };
        let conn = ClientConn::connect(target, Some("127.0.0.1".to_string()), Arc::new(ClientConfig::default())).await;
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Target { scheme: Scheme::Http, host: "127.0.0.1".to_string(), port };
        let result = ClientConn::connect(target, None, Arc::new(ClientConfig::default())).await;
        assert!(matches!(result, Err(ConnError::Connect { .. })));
    }
}
