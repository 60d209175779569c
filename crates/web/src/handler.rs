//! Request handler traits and their closure adapters.

use async_trait::async_trait;
use futures::future::BoxFuture;
use micro_wire::connection::{Conn, MaybeTlsStream};
use micro_wire::protocol::{Request, Response};
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::ClientRegistry;

pub type BoxError = Box<dyn Error + Send + Sync>;

pub type HandlerResult = Result<Response, BoxError>;

/// Produces the response for a routed request.
///
/// Returning a response without a status, or an error, passes the request on to the
/// unhandled hook.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, request: &mut Request) -> HandlerResult;
}

/// a closure holder which represents any `Fn(&mut Request) -> BoxFuture<HandlerResult>`
pub struct FnHandler<F> {
    f: F,
}

/// Wraps a closure as a [`RequestHandler`]:
///
/// ```
/// use micro_wire::protocol::Response;
/// use micro_wire_web::handler_fn;
///
/// let hello = handler_fn(|_req| Box::pin(async move { Ok(Response::from_text("hello")) }));
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, request: &mut Request) -> HandlerResult {
        (self.f)(request).await
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Hook run before routing; a returned response short-circuits the handler.
pub type BeforeHook = dyn for<'r> Fn(&'r mut Request) -> BoxFuture<'r, Option<Response>> + Send + Sync;

/// Hook run on every response just before it is written.
pub type AfterHook = dyn for<'r> Fn(&'r Request, &'r mut Response) -> BoxFuture<'r, ()> + Send + Sync;

/// Everything a connection handler gets for one accepted connection.
#[derive(Debug)]
pub struct ConnContext {
    pub id: u64,
    pub conn: Conn<MaybeTlsStream>,
    pub peer: SocketAddr,
    pub local_port: u16,
    pub secure: bool,
    pub registry: Arc<ClientRegistry>,
}

/// Runs one accepted connection to completion, on its own task.
#[async_trait]
pub trait ConnHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: ConnContext);
}

pub struct FnConnHandler<F> {
    f: F,
}

pub fn conn_handler_fn<F, Fut>(f: F) -> FnConnHandler<F>
where
    F: Fn(ConnContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnConnHandler { f }
}

#[async_trait]
impl<F, Fut> ConnHandler for FnConnHandler<F>
where
    F: Fn(ConnContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: ConnContext) {
        (self.f)(ctx).await;
    }
}

impl<F> std::fmt::Debug for FnConnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnConnHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn assert_is_handler<T: RequestHandler>(_handler: &T) {
        // no op
    }

    fn assert_is_conn_handler<T: ConnHandler>(_handler: &T) {
        // no op
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = handler_fn(|req| {
            Box::pin(async move {
                req.set_content("seen");
                Ok(Response::from_text(req.path().to_string()))
            })
        });
        assert_is_handler(&handler);

        let mut request = Request::new(Method::GET, "http://localhost/hi");
        let response = handler.invoke(&mut request).await.unwrap();
        assert_eq!(response.text(), "/hi");
        assert_eq!(request.content().as_ref(), b"seen");
    }

    #[test]
    fn test_conn_handler_fn() {
        let handler = conn_handler_fn(|ctx: ConnContext| async move {
            drop(ctx);
        });
        assert_is_conn_handler(&handler);
    }
}
