//! Listener binding and serving.
//!
//! # Responsibilities
//! - Bind the configured address, reporting failures synchronously
//! - Serve a router over plain TCP or TLS
//! - Drain in-flight connections within a deadline
//!
//! # Design Decisions
//! - The socket is bound before the server task starts, so a busy port is
//!   an error of the start attempt rather than of a background task
//! - Each listener owns its shutdown handle; dropping the handle does not
//!   stop the server, draining does

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Bind a listening socket ready to hand to the server.
pub fn bind(addr: SocketAddr) -> Result<std::net::TcpListener, ListenerError> {
    let bind_error = |source| ListenerError::Bind { addr, source };
    let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    Ok(listener)
}

/// A server accepting connections on one bound socket.
#[derive(Debug)]
pub struct RunningListener {
    local_addr: SocketAddr,
    secure: bool,
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningListener {
    /// Start serving `router` on `listener`, with TLS when `tls` is given.
    pub fn start(
        listener: std::net::TcpListener,
        router: Router,
        tls: Option<RustlsConfig>,
    ) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr()?;
        let handle = Handle::new();
        let secure = tls.is_some();
        let app = router.into_make_service_with_connect_info::<SocketAddr>();

        let task = match tls {
            Some(config) => {
                let server = axum_server::from_tcp_rustls(listener, config).handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await })
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await })
            }
        };

        tracing::info!(address = %local_addr, tls = secure, "Listener started");

        Ok(Self {
            local_addr,
            secure,
            handle,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Stop accepting, let in-flight requests finish, and force-close
    /// whatever is still open when `deadline` passes.
    pub async fn drain(self, deadline: Duration) -> Result<(), ListenerError> {
        tracing::info!(
            address = %self.local_addr,
            connections = self.handle.connection_count(),
            deadline_secs = deadline.as_secs_f64(),
            "Draining listener"
        );
        self.handle.graceful_shutdown(Some(deadline));
        self.task.await??;
        tracing::info!(address = %self.local_addr, "Listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        let err = bind(addr).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn serves_then_drains() {
        let socket = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let router = Router::new().route("/", get(|| async { "up" }));
        let running = RunningListener::start(socket, router, None).unwrap();
        let addr = running.local_addr();
        assert!(!running.is_secure());

        let body = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "up");

        running.drain(Duration::from_secs(1)).await.unwrap();
        assert!(reqwest::get(format!("http://{addr}/")).await.is_err());

        // The address is free again once draining completes.
        let again = bind(addr).unwrap();
        drop(again);
    }
}
