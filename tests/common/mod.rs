//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use axum::http::StatusCode;
use gatehouse::config::GatewayConfig;
use gatehouse::lifecycle::{ControllerState, ControllerStatus, StartError};
use gatehouse::observability::LogBuffer;
use gatehouse::{ReloadController, Shutdown};

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn local_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], free_port()))
}

/// Minimal configuration listening on `port` with no services.
pub fn gateway_config(port: u16) -> GatewayConfig {
    GatewayConfig {
        host_address: "127.0.0.1".into(),
        port,
        development_mode: false,
        shutdown_timeout_secs: 5,
        ..GatewayConfig::default()
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    start_programmable_backend(addr, move |_head| async move { (200, response.to_string()) }).await;
}

/// Start a programmable mock backend.
///
/// `f` receives the raw request head and returns the status and body.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(head).await;
                        let reason = StatusCode::from_u16(status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");

                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// A gateway running under a reload controller.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
    pub status: watch::Receiver<ControllerStatus>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), StartError>>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let controller = ReloadController::new(config, LogBuffer::default());
        let mut status = controller.subscribe();
        let (updates, rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(controller.run(rx, shutdown.wait()));

        let running = *tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.state == ControllerState::Running),
        )
        .await
        .expect("gateway did not start")
        .unwrap();

        Self {
            addr: running.local_addr.unwrap(),
            updates,
            status,
            shutdown,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn generation(&self) -> u64 {
        self.status.borrow().generation
    }

    /// Push a configuration without waiting for it to apply.
    pub fn push(&self, config: GatewayConfig) {
        self.updates.send(config).unwrap();
    }

    /// Wait until a generation newer than `after` is running.
    pub async fn wait_for_generation(&mut self, after: u64) {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.status
                .wait_for(|s| s.state == ControllerState::Running && s.generation > after),
        )
        .await
        .expect("reload did not complete")
        .unwrap();
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

/// A client that does not reuse connections across requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Send raw bytes and return the raw response.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    String::from_utf8_lossy(&response).into_owned()
}
