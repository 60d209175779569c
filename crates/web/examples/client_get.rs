use micro_wire::client::{self, Session};
use std::env;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:3000/".to_string());

    // one session, so both requests share a single connection
    let session = Session::default();
    for _ in 0..2 {
        match session.get(&url, vec![client::timeout(Duration::from_secs(5))]).await {
            Ok(response) => info!(code = response.http_code(), body = %response.text(), "got response"),
            Err(e) => error!(cause = %e, "request failed"),
        }
    }
}
