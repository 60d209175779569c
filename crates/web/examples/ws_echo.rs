use micro_wire::codec::WsType;
use micro_wire::protocol::{Response, WsError};
use micro_wire_web::{HttpServer, handler_fn};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = HttpServer::builder()
        .route(
            "/ws",
            handler_fn(|req| {
                Box::pin(async move {
                    let mut ws = req.upgrade_websocket().await?;
                    loop {
                        match ws.recv().await {
                            Ok(message) if message.kind == WsType::Text => {
                                ws.send_text(message.as_text().unwrap_or_default()).await?;
                            }
                            Ok(message) => ws.send_binary(message.payload).await?,
                            Err(WsError::Closed) => break,
                            Err(e) => {
                                warn!(cause = %e, "websocket receive failed");
                                break;
                            }
                        }
                    }
                    info!("websocket session finished");
                    Ok(Response::empty())
                })
            }),
        )
        .build();

    if let Err(e) = server.run("127.0.0.1:3001").await {
        error!(cause = %e, "server exited");
    }
}
