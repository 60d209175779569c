use http::{HeaderValue, StatusCode};
use micro_wire::protocol::Response;
use micro_wire_web::{HttpServer, handler_fn};
use serde::Deserialize;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
struct Greeting {
    name: String,
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = HttpServer::builder()
        .route("/", handler_fn(|_req| Box::pin(async move { Ok(Response::from_text("hello world")) })))
        .route(
            "/greet",
            handler_fn(|req| {
                Box::pin(async move {
                    let greeting: Greeting = req.query()?;
                    Ok(Response::from_json(&serde_json::json!({ "hello": greeting.name }))?)
                })
            }),
        )
        .on_unhandled(handler_fn(|req| {
            Box::pin(async move {
                info!(path = req.path(), "no route");
                Ok(Response::from_status(StatusCode::NOT_FOUND))
            })
        }))
        .on_after(|_req, resp| {
            Box::pin(async move {
                resp.headers_mut().insert("x-powered-by", HeaderValue::from_static("micro-wire"));
            })
        })
        .build();

    if let Err(e) = server.run("127.0.0.1:3000").await {
        error!(cause = %e, "server exited");
    }
}
