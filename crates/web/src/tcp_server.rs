//! A TCP accept loop that runs one task per connection.

use crate::{ClientRegistry, ConnContext, ConnHandler};
use micro_wire::connection::{Conn, MaybeTlsStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::select;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind server address failed: {source}")]
    Bind {
        #[source]
        source: std::io::Error,
    },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server has been stopped")]
    Stopped,
}

/// Accepts connections and hands each one, on its own task, to a [`ConnHandler`].
///
/// Connections get sequential ids starting at 1. [`stop`](TcpServer::stop) ends the accept
/// loop and cancels every connection it accepted; a stopped server cannot be run again.
pub struct TcpServer {
    handler: Arc<dyn ConnHandler>,
    registry: Arc<ClientRegistry>,
    canceller: CancellationToken,
    running: AtomicBool,
    next_id: AtomicU64,
    no_delay: bool,
}

impl TcpServer {
    pub fn new<H: ConnHandler>(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    pub(crate) fn from_arc(handler: Arc<dyn ConnHandler>) -> Self {
        Self {
            handler,
            registry: Arc::new(ClientRegistry::new()),
            canceller: CancellationToken::new(),
            running: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            no_delay: true,
        }
    }

    #[must_use]
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn run<A: ToSocketAddrs>(&self, addr: A) -> Result<(), ServerError> {
        let listener = bind(addr).await?;
        self.run_listener(listener, None).await
    }

    /// Like [`run`](TcpServer::run), with a TLS handshake on every accepted connection.
    pub async fn run_tls<A: ToSocketAddrs>(&self, addr: A, acceptor: TlsAcceptor) -> Result<(), ServerError> {
        let listener = bind(addr).await?;
        self.run_listener(listener, Some(acceptor)).await
    }

    /// Serves on an already bound listener until [`stop`](TcpServer::stop) is called.
    pub async fn run_listener(&self, listener: TcpListener, acceptor: Option<TlsAcceptor>) -> Result<(), ServerError> {
        if self.canceller.is_cancelled() {
            return Err(ServerError::Stopped);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyRunning);
        }

        let local_port = listener.local_addr().map_err(|e| ServerError::Bind { source: e })?.port();
        info!(port = local_port, tls = acceptor.is_some(), "start listening");

        loop {
            let (tcp_stream, peer) = select! {
                biased;
                () = self.canceller.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            if self.no_delay
                && let Err(e) = tcp_stream.set_nodelay(true)
            {
                debug!(cause = %e, "set nodelay failed");
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let handler = Arc::clone(&self.handler);
            let registry = Arc::clone(&self.registry);
            let canceller = self.canceller.child_token();
            let acceptor = acceptor.clone();

            tokio::spawn(async move {
                let stream = match acceptor {
                    None => MaybeTlsStream::plain(tcp_stream),
                    Some(acceptor) => match acceptor.accept(tcp_stream).await {
                        Ok(tls_stream) => MaybeTlsStream::tls(tls_stream),
                        Err(e) => {
                            warn!(cause = %e, %peer, "tls handshake failed");
                            return;
                        }
                    },
                };

                let secure = stream.is_secure();
                let conn = Conn::with_canceller(stream, canceller);
                debug!(id, %peer, "connection accepted");
                handler.handle(ConnContext { id, conn, peer, local_port, secure, registry }).await;
                debug!(id, %peer, "connection finished");
            });
        }

        self.running.store(false, Ordering::Release);
        info!(port = local_port, "server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.canceller.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

async fn bind<A: ToSocketAddrs>(addr: A) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|e| {
        error!(cause = %e, "bind server error");
        ServerError::Bind { source: e }
    })
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("running", &self.is_running())
            .field("clients", &self.registry.len())
            .field("no_delay", &self.no_delay)
            .finish_non_exhaustive()
    }
}
