//! # Example: sse_fanout
//!
//! A bare-bones SSE endpoint over raw TCP: every connection gets a `hello`
//! frame, one `clock.tick` event per second and a `ping` every 5 seconds.
//!
//! ## Flow
//! ```text
//! TcpListener::accept ──► write SSE_HEADERS ──► serve_stream(SseWriter<TcpStream>)
//! ticker ──► publish("clock.tick") ──► Broker ──► every connection
//! Ctrl-C ──► shutdown ──► every connection loop returns
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example sse_fanout
//! curl -N http://127.0.0.1:8080/events
//! ```

use std::sync::Arc;
use std::time::Duration;

use backchannel::{Backchannel, BrokerConfig, Config, SSE_HEADERS, SseWriter};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn handle(
    bc: Arc<Backchannel>,
    mut stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The request itself is irrelevant here; read whatever arrived.
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let mut head = String::from("HTTP/1.1 200 OK\r\n");
    for (name, value) in SSE_HEADERS {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await?;

    let mut writer = SseWriter::new(stream);
    bc.serve_stream(CancellationToken::new(), &mut writer).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let cfg = Config {
        broker: BrokerConfig {
            mailbox_capacity: 16,
            keepalive: Duration::from_secs(5),
        },
        ..Config::default()
    };
    let bc = Arc::new(Backchannel::new(cfg));
    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    println!("[main] listening on http://127.0.0.1:8080/events");

    let ticker = Arc::clone(&bc);
    tokio::spawn(async move {
        let mut n = 0u64;
        while !ticker.is_shut_down() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            n += 1;
            ticker.publish("clock.tick", json!({ "n": n })).await;
        }
    });

    let acceptor = Arc::clone(&bc);
    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            let bc = Arc::clone(&acceptor);
            tokio::spawn(async move {
                if let Err(e) = handle(bc, stream).await {
                    println!("[conn {peer}] closed: {e}");
                }
            });
        }
    });

    bc.shutdown_on_signal().await?;
    println!("[main] stopped");
    Ok(())
}
