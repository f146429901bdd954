#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;

use fetcher_core::{RequestExecutor, SessionConfig, SessionManager};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Session with fast retries and the given seed headers, plus an executor on it.
pub fn executor_with_headers(headers: &[(&str, &str)]) -> (Arc<SessionManager>, RequestExecutor) {
    executor_with_config(
        headers,
        SessionConfig {
            retry_base_delay_ms: 0,
            ..SessionConfig::default()
        },
    )
}

/// Session built from `config` with the given seed headers, plus an executor on it.
pub fn executor_with_config(
    headers: &[(&str, &str)],
    config: SessionConfig,
) -> (Arc<SessionManager>, RequestExecutor) {
    let session = Arc::new(
        SessionManager::open_with_config(headers.iter().copied(), config)
            .expect("session should open"),
    );
    let executor = RequestExecutor::new(Arc::clone(&session));
    (session, executor)
}

/// A localhost port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

/// Accepts one connection, reads the request head and writes `response`
/// verbatim before closing the socket.
pub async fn answer_once(listener: TcpListener, response: Vec<u8>) -> std::io::Result<()> {
    let (mut stream, _) = listener.accept().await?;
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&buf[..read]);
    }
    stream.write_all(&response).await?;
    stream.shutdown().await
}
