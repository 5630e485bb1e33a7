//! Shared utilities for integration testing against a mock configuration agent.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use appconfig_gate::sync::RemoteEndpoint;

pub fn endpoint() -> RemoteEndpoint {
    RemoteEndpoint {
        application: "myapp".into(),
        environment: "prod".into(),
        profile: "app-config".into(),
    }
}

/// Read until the end of the request headers; return the request line.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        304 => "304 Not Modified",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a programmable mock agent on an ephemeral port.
///
/// `f` receives the request line (e.g. `GET /applications/... HTTP/1.1`) and
/// returns the status code and body to answer with.
pub async fn start_programmable_agent<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request_line = read_request(&mut socket).await;
                        let (status, body) = f(request_line).await;

                        let response = if status == 304 {
                            "HTTP/1.1 304 Not Modified\r\nConnection: close\r\n\r\n".to_string()
                        } else {
                            format!(
                                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                status_text(status),
                                body.len(),
                                body
                            )
                        };
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock agent that always answers with the same status and body.
#[allow(dead_code)]
pub async fn start_fixed_agent(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_agent(move |_| async move { (status, body.to_string()) }).await
}

/// Start a mock agent that accepts connections and never answers.
#[allow(dead_code)]
pub async fn start_silent_agent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Start a mock agent that answers with an error status, promises a huge
/// body, sends `sent` bytes of it and then keeps the connection open.
#[allow(dead_code)]
pub async fn start_stalled_error_agent(status: u16, sent: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            read_request(&mut socket).await;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: 10000000\r\n\r\n",
                status_text(status)
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&vec![b'x'; sent]).await;
            let _ = socket.flush().await;
            held.push(socket);
        }
    });

    addr
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}
