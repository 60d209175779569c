//! Async TCP and HTTP servers built on `micro-wire`.
//!
//! [`TcpServer`] accepts connections and runs a [`ConnHandler`] per connection.
//! [`HttpServer`] layers an HTTP keep-alive loop on it with exact path routing and
//! `before`/`after`/`unhandled` hooks:
//!
//! ```no_run
//! use micro_wire::protocol::Response;
//! use micro_wire_web::{HttpServer, handler_fn};
//!
//! # async fn serve() -> Result<(), micro_wire_web::ServerError> {
//! let server = HttpServer::builder()
//!     .route("/hello", handler_fn(|_req| Box::pin(async move { Ok(Response::from_text("hello world")) })))
//!     .build();
//! server.run("127.0.0.1:8080").await
//! # }
//! ```

mod handler;
mod http_server;
mod registry;
mod tcp_server;

pub use handler::{
    AfterHook, BeforeHook, BoxError, ConnContext, ConnHandler, FnConnHandler, FnHandler, HandlerResult,
    RequestHandler, conn_handler_fn, handler_fn,
};
pub use http_server::{HttpServer, HttpServerBuilder};
pub use registry::ClientRegistry;
pub use tcp_server::{ServerError, TcpServer};
