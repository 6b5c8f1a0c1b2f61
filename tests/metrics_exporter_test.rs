use std::net::TcpListener;
use std::time::Duration;

use anyhow::Result;
use loan_sync::metrics::{self, METRICS_ADDR_ENV};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// Own test binary: the recorder is process-global and installed once.
#[tokio::test]
async fn test_configured_address_serves_prometheus_text() -> Result<()> {
    let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    std::env::set_var(METRICS_ADDR_ENV, addr.to_string());

    metrics::init_metrics();
    assert!(metrics::render().is_some());

    let mut stream = None;
    for _ in 0..50 {
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut stream = stream.expect("exporter accepts connections");
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");

    Ok(())
}
