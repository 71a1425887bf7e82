//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use breaker_gateway::config::{GatewayConfig, RouteConfig};
use breaker_gateway::lifecycle::{startup, Shutdown, StartupError};

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the request target (path and query) and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some(target) = read_request_target(&mut socket).await else {
                    return;
                };
                let (status, body) = f(target).await;
                let status_text = match status {
                    200 => "200 OK",
                    201 => "201 Created",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock backend that always answers with `status` and echoes the request target.
pub async fn start_fixed_backend(status: u16) -> SocketAddr {
    start_programmable_backend(move |target| async move { (status, target) }).await
}

/// Read request headers and return the target from the request line.
async fn read_request_target(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config with one route per `(prefix, backend)` and a short open timeout.
pub fn gateway_config(routes: &[(&str, SocketAddr)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.routes = routes
        .iter()
        .map(|(prefix, addr)| RouteConfig::new(*prefix, format!("http://{addr}")))
        .collect();
    config.breaker.open_timeout_ms = 200;
    config.breaker.max_half_open_trials = 1;
    config.timeouts.backend_ms = 2_000;
    config
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    done: oneshot::Receiver<Result<(), StartupError>>,
}

impl TestGateway {
    pub async fn start(mut config: GatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        config.listener.bind_address = addr.to_string();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.clone();
        let (tx, done) = oneshot::channel();
        tokio::spawn(async move {
            let result = startup::serve(config, listener, server_shutdown).await;
            let _ = tx.send(result);
        });

        Self { addr, shutdown, done }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to exit.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.done)
            .await
            .expect("server did not stop")
            .expect("server task dropped")
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `/breaker-status` until `route` reports `status`.
pub async fn wait_for_status(gateway: &TestGateway, route: &str, status: &str) -> serde_json::Value {
    let client = client();
    for _ in 0..50 {
        let json: serde_json::Value = client
            .get(gateway.url("/breaker-status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json[route]["status"] == status {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{route} never reached {status}");
}
