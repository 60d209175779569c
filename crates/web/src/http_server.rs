//! HTTP dispatch on top of [`TcpServer`].
//!
//! Every accepted connection runs a keep-alive loop: decode a request, run the `before`
//! hook, route by exact path, fall back to the `unhandled` hook and then to `404`, run the
//! `after` hook and write the response. A handler that upgrades the request to a websocket
//! takes the connection with it and the loop ends without closing it.

use crate::handler::{AfterHook, BeforeHook};
use crate::tcp_server::{ServerError, TcpServer};
use crate::{BoxError, ClientRegistry, ConnContext, ConnHandler, RequestHandler};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::future::BoxFuture;
use http::{HeaderValue, Method, StatusCode, header};
use micro_wire::codec::{MAX_BODY_SIZE, RequestDecoder, ResponseEncoder};
use micro_wire::connection::{ConnWriter, MaybeTlsStream};
use micro_wire::protocol::{ParseError, Request, Response, UpgradeSlot};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, warn};

pub struct HttpServerBuilder {
    routes: HashMap<String, Box<dyn RequestHandler>>,
    before: Option<Box<BeforeHook>>,
    after: Option<Box<AfterHook>>,
    unhandled: Option<Box<dyn RequestHandler>>,
    no_delay: bool,
    max_body_size: usize,
}

impl HttpServerBuilder {
    fn new() -> Self {
        Self {
            routes: HashMap::new(),
            before: None,
            after: None,
            unhandled: None,
            no_delay: true,
            max_body_size: MAX_BODY_SIZE,
        }
    }

    /// Registers `handler` for requests whose path is exactly `path`. A later registration
    /// for the same path replaces the earlier one.
    #[must_use]
    pub fn route<P: Into<String>>(mut self, path: P, handler: impl RequestHandler + 'static) -> Self {
        self.routes.insert(path.into(), Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_before<F>(mut self, hook: F) -> Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, Option<Response>> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_after<F>(mut self, hook: F) -> Self
    where
        F: for<'r> Fn(&'r Request, &'r mut Response) -> BoxFuture<'r, ()> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// Handler for requests no route answered, including routes that failed.
    #[must_use]
    pub fn on_unhandled(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.unhandled = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// Largest request body accepted after decoding; larger requests get `400`.
    #[must_use]
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> HttpServer {
        let dispatcher = Dispatcher {
            routes: self.routes,
            before: self.before,
            after: self.after,
            unhandled: self.unhandled,
            max_body_size: self.max_body_size,
        };
        HttpServer { tcp: TcpServer::from_arc(Arc::new(dispatcher)).no_delay(self.no_delay) }
    }
}

impl fmt::Debug for HttpServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerBuilder")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("no_delay", &self.no_delay)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct HttpServer {
    tcp: TcpServer,
}

impl HttpServer {
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    pub async fn run<A: ToSocketAddrs>(&self, addr: A) -> Result<(), ServerError> {
        self.tcp.run(addr).await
    }

    pub async fn run_tls<A: ToSocketAddrs>(&self, addr: A, acceptor: TlsAcceptor) -> Result<(), ServerError> {
        self.tcp.run_tls(addr, acceptor).await
    }

    pub async fn run_listener(&self, listener: TcpListener, acceptor: Option<TlsAcceptor>) -> Result<(), ServerError> {
        self.tcp.run_listener(listener, acceptor).await
    }

    pub fn stop(&self) {
        self.tcp.stop();
    }

    pub fn is_running(&self) -> bool {
        self.tcp.is_running()
    }

    /// Connections currently inside the HTTP loop, for raw sends and broadcasts. A connection
    /// leaves the registry while a websocket upgrade request is dispatched.
    pub fn clients(&self) -> Arc<ClientRegistry> {
        self.tcp.registry()
    }
}

struct Dispatcher {
    routes: HashMap<String, Box<dyn RequestHandler>>,
    before: Option<Box<BeforeHook>>,
    after: Option<Box<AfterHook>>,
    unhandled: Option<Box<dyn RequestHandler>>,
    max_body_size: usize,
}

impl Dispatcher {
    async fn dispatch(&self, request: &mut Request) -> Response {
        if let Some(before) = &self.before
            && let Some(response) = before(&mut *request).await
        {
            return response;
        }

        let mut response = match self.routes.get(request.path()) {
            Some(handler) => invoke(handler.as_ref(), request).await,
            None => Response::empty(),
        };

        if !response.is_handled()
            && !request.is_upgraded()
            && let Some(unhandled) = &self.unhandled
        {
            response = invoke(unhandled.as_ref(), request).await;
        }

        if response.is_handled() { response } else { Response::from_not_found() }
    }
}

async fn invoke(handler: &dyn RequestHandler, request: &mut Request) -> Response {
    match handler.invoke(request).await {
        Ok(response) => response,
        Err(e) => {
            error!(path = request.path(), cause = %e, "handler failed");
            Response::empty()
        }
    }
}

#[async_trait]
impl ConnHandler for Dispatcher {
    async fn handle(&self, ctx: ConnContext) {
        let ConnContext { id, mut conn, peer, local_port, secure, registry } = ctx;
        let writer = conn.writer().clone();
        registry.register(id, writer.clone());

        let mut decoder = RequestDecoder::new(local_port, secure).with_max_body_size(self.max_body_size);
        let slot: UpgradeSlot = Arc::new(Mutex::new(None));

        loop {
            let mut request = match conn.reader().decode(&mut decoder).await {
                Ok(request) => request,
                Err(e) if e.is_closed() => {
                    debug!(id, %peer, "peer closed connection");
                    break;
                }
                Err(e @ (ParseError::Conn { .. } | ParseError::Io { .. })) => {
                    debug!(id, %peer, cause = %e, "read request failed");
                    break;
                }
                Err(e) => {
                    warn!(id, %peer, cause = %e, "bad request");
                    let response = Response::from_status(StatusCode::BAD_REQUEST);
                    if let Err(e) = send_response(&writer, &Method::GET, response).await {
                        debug!(id, cause = %e, "send bad request response failed");
                    }
                    break;
                }
            };

            let wants_close = request.wants_close();
            let method = request.method().clone();
            // Raw sends would interleave with websocket frames once the handler upgrades.
            let upgrading = request.is_websocket();
            if upgrading {
                registry.unregister(id, &writer);
            }
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn);
            request.attach_upgrade_slot(Arc::clone(&slot));

            let mut response = self.dispatch(&mut request).await;

            let reclaimed = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            let Some(reclaimed) = reclaimed else {
                info!(id, %peer, path = request.path(), "connection upgraded, leaving http loop");
                registry.unregister(id, &writer);
                return;
            };
            conn = reclaimed;
            if upgrading {
                registry.register(id, writer.clone());
            }

            if let Some(after) = &self.after {
                after(&request, &mut response).await;
            }
            if wants_close {
                response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
            }

            if let Err(e) = send_response(&writer, &method, response).await {
                warn!(id, %peer, cause = %e, "send response failed");
                break;
            }
            if wants_close {
                break;
            }
        }

        registry.unregister(id, &writer);
        conn.close().await;
        info!(id, %peer, "connection shutdown");
    }
}

async fn send_response(
    writer: &ConnWriter<MaybeTlsStream>,
    method: &Method,
    response: Response,
) -> Result<(), BoxError> {
    let mut buf = BytesMut::new();
    ResponseEncoder::for_method(method).encode(response, &mut buf)?;
    writer.send(&buf).await?;
    Ok(())
}
