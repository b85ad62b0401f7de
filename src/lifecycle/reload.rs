//! Hot reload and graceful restart.
//!
//! The controller owns at most one running listener. A reload:
//! 1. compiles the new route table and loads TLS material (old listener untouched on failure)
//! 2. drains the old listener within the shutdown deadline
//! 3. binds and starts the new listener
//!
//! If step 3 fails, the previous configuration is started again. If that
//! fails too, the controller is left stopped until the next update.
//!
//! ```text
//! Stopped → Starting → Running → Draining → Starting → Running ...
//!                                  (shutdown) → Stopped
//! ```

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::future::Future;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::GatewayConfig;
use crate::http::Gateway;
use crate::net::{bind, load_https, ListenerError, RunningListener};
use crate::observability::{metrics, LogBuffer, Logging};
use crate::routing::{compile_route_table, CompileContext};
use crate::security::{AccessList, RateLimiter, RefillTask};

/// Why a start attempt was abandoned.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid listen address: {0}")]
    Address(#[from] AddrParseError),

    #[error("cannot load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Starting,
    Running,
    Draining,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: ControllerState,
    /// Generation of the route table being served; 0 before the first start.
    pub generation: u64,
    pub local_addr: Option<SocketAddr>,
}

/// A generation that is ready to be bound.
struct Prepared {
    addr: SocketAddr,
    router: Router,
    tls: Option<RustlsConfig>,
    generation: u64,
}

pub struct ReloadController {
    config: GatewayConfig,
    logs: LogBuffer,
    /// Present when `observability.log_level` controls the filter.
    logging: Option<Logging>,
    applied_level: Option<String>,
    limiter: Arc<RateLimiter>,
    refill: Option<RefillTask>,
    listener: Option<RunningListener>,
    generation: u64,
    status: watch::Sender<ControllerStatus>,
}

impl ReloadController {
    pub fn new(config: GatewayConfig, logs: LogBuffer) -> Self {
        let max_requests = config.rate_limiting.as_ref().map_or(0, |rl| rl.max_requests);
        let (status, _) = watch::channel(ControllerStatus {
            state: ControllerState::Stopped,
            generation: 0,
            local_addr: None,
        });

        Self {
            config,
            logs,
            logging: None,
            applied_level: None,
            limiter: Arc::new(RateLimiter::new(max_requests)),
            refill: None,
            listener: None,
            generation: 0,
            status,
        }
    }

    /// Apply each generation's `observability.log_level` to `logging`.
    pub fn with_logging(mut self, logging: Logging) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> ControllerStatus {
        *self.status.borrow()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The limiter shared by every generation.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn set_state(&self, state: ControllerState) {
        self.status.send_replace(ControllerStatus {
            state,
            generation: self.generation,
            local_addr: self.listener.as_ref().map(RunningListener::local_addr),
        });
    }

    fn drain_deadline(&self) -> Duration {
        Duration::from_secs(self.config.shutdown_timeout_secs)
    }

    /// Start the first generation.
    pub async fn start(&mut self) -> Result<(), StartError> {
        self.set_state(ControllerState::Starting);
        let config = self.config.clone();
        match self.prepare(&config).await {
            Ok(prepared) => self.launch(prepared, &config),
            Err(e) => {
                tracing::error!(error = %e, "Gateway failed to start");
                self.set_state(ControllerState::Stopped);
                Err(e)
            }
        }
    }

    /// Replace the running generation with one built from `config`.
    pub async fn reload(&mut self, config: GatewayConfig) -> Result<(), StartError> {
        if self.listener.is_none() {
            self.config = config;
            let result = self.start().await;
            metrics::record_reload(if result.is_ok() { "ok" } else { "failed" });
            return result;
        }

        let prepared = match self.prepare(&config).await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(error = %e, "Reload aborted, keeping current listener");
                metrics::record_reload("failed");
                return Err(e);
            }
        };

        self.drain().await;
        self.set_state(ControllerState::Starting);

        match self.launch(prepared, &config) {
            Ok(()) => {
                self.config = config;
                tracing::info!(generation = self.generation, "Reload complete");
                metrics::record_reload("ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "New listener failed to start, restoring previous configuration");
                metrics::record_reload("failed");
                let previous = self.config.clone();
                let restored = match self.prepare(&previous).await {
                    Ok(prepared) => self.launch(prepared, &previous),
                    Err(e) => Err(e),
                };
                if let Err(restore_error) = restored {
                    tracing::error!(error = %restore_error, "Previous configuration failed to start, gateway stopped");
                    self.set_state(ControllerState::Stopped);
                }
                Err(e)
            }
        }
    }

    /// Drain the listener and stop the refill task.
    pub async fn stop(&mut self) {
        self.drain().await;
        self.refill = None;
        self.set_state(ControllerState::Stopped);
        tracing::info!("Gateway stopped");
    }

    /// Serve until `shutdown` resolves, applying configurations from `updates`.
    ///
    /// Failing to start the initial configuration is returned as an error;
    /// failed reloads are logged and the loop continues.
    pub async fn run<S>(
        mut self,
        mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: S,
    ) -> Result<(), StartError>
    where
        S: Future<Output = ()>,
    {
        self.start().await?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                update = updates.recv() => match update {
                    Some(mut config) => {
                        // Editors often produce several events per save.
                        while let Ok(newer) = updates.try_recv() {
                            config = newer;
                        }
                        let _ = self.reload(config).await;
                    }
                    None => {
                        (&mut shutdown).await;
                        break;
                    }
                },
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn prepare(&self, config: &GatewayConfig) -> Result<Prepared, StartError> {
        let addr = config.bind_address()?;
        let tls = match &config.https {
            Some(https) => Some(load_https(https).await.map_err(StartError::Tls)?),
            None => None,
        };

        let generation = self.generation + 1;
        let ctx = CompileContext::new(tls.is_some());
        let table = compile_route_table(&config.services, &ctx).await;
        tracing::info!(generation, services = table.len(), "Route table compiled");

        let router = Gateway {
            table,
            generation,
            development_mode: config.development_mode,
            access: Arc::new(AccessList::new(&config.whitelist, &config.blacklist)),
            limiter: config.rate_limiting.as_ref().map(|_| self.limiter.clone()),
            logs: self.logs.clone(),
        }
        .into_router();

        Ok(Prepared {
            addr,
            router,
            tls,
            generation,
        })
    }

    fn launch(&mut self, prepared: Prepared, config: &GatewayConfig) -> Result<(), StartError> {
        let socket = bind(prepared.addr)?;
        self.apply_rate_limits(config);
        self.apply_log_level(config);
        let listener = RunningListener::start(socket, prepared.router, prepared.tls)?;

        if config.development_mode {
            tracing::warn!(
                address = %listener.local_addr(),
                tls = listener.is_secure(),
                "Development mode is enabled, /debug endpoints are exposed"
            );
        }

        self.listener = Some(listener);
        self.generation = prepared.generation;
        self.set_state(ControllerState::Running);
        Ok(())
    }

    async fn drain(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.status.send_replace(ControllerStatus {
            state: ControllerState::Draining,
            generation: self.generation,
            local_addr: Some(listener.local_addr()),
        });
        if let Err(e) = listener.drain(self.drain_deadline()).await {
            tracing::error!(error = %e, "Listener stopped with an error");
        }
    }

    fn apply_log_level(&mut self, config: &GatewayConfig) {
        let Some(logging) = &self.logging else {
            return;
        };
        let level = &config.observability.log_level;
        if self.applied_level.as_ref() != Some(level) {
            logging.set_level(level);
            self.applied_level = Some(level.clone());
        }
    }

    fn apply_rate_limits(&mut self, config: &GatewayConfig) {
        match &config.rate_limiting {
            Some(rl) => {
                self.limiter.set_max_requests(rl.max_requests);
                let interval = Duration::from_millis(rl.refill_interval_ms);
                if self.refill.as_ref().map(RefillTask::interval) != Some(interval) {
                    self.refill = Some(self.limiter.spawn_refill(interval));
                }
            }
            None => self.refill = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpsConfig, RateLimitConfig, ServiceDefinition};
    use std::fs;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn static_config(port: u16, route: &str, dir: &std::path::Path) -> GatewayConfig {
        let mut config = GatewayConfig {
            host_address: "127.0.0.1".into(),
            port,
            shutdown_timeout_secs: 1,
            ..GatewayConfig::default()
        };
        config
            .services
            .insert("site".into(), ServiceDefinition::static_files(route, dir));
        config
    }

    async fn status_of(url: String) -> u16 {
        reqwest::get(url).await.unwrap().status().as_u16()
    }

    #[tokio::test]
    async fn reload_switches_route_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let port = free_port();

        let mut controller = ReloadController::new(static_config(port, "/old", dir.path()), LogBuffer::default());
        controller.start().await.unwrap();
        assert_eq!(controller.status().state, ControllerState::Running);
        assert_eq!(controller.status().generation, 1);
        assert_eq!(status_of(format!("http://127.0.0.1:{port}/old/a.txt")).await, 200);

        controller.reload(static_config(port, "/new", dir.path())).await.unwrap();
        assert_eq!(controller.status().generation, 2);
        assert_eq!(status_of(format!("http://127.0.0.1:{port}/new/a.txt")).await, 200);
        assert_eq!(status_of(format!("http://127.0.0.1:{port}/old/a.txt")).await, 404);

        controller.stop().await;
        assert_eq!(controller.status().state, ControllerState::Stopped);
        assert!(reqwest::get(format!("http://127.0.0.1:{port}/new/a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn missing_tls_material_keeps_old_listener() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let port = free_port();

        let mut controller = ReloadController::new(static_config(port, "/", dir.path()), LogBuffer::default());
        controller.start().await.unwrap();

        let mut broken = static_config(port, "/", dir.path());
        broken.https = Some(HttpsConfig {
            certificate_file: Some(dir.path().join("missing-cert.pem")),
            key_file: Some(dir.path().join("missing-key.pem")),
        });
        let err = controller.reload(broken).await.unwrap_err();
        assert!(matches!(err, StartError::Tls(_)));

        assert_eq!(controller.status().state, ControllerState::Running);
        assert_eq!(controller.status().generation, 1);
        assert_eq!(status_of(format!("http://127.0.0.1:{port}/a.txt")).await, 200);
        controller.stop().await;
    }

    #[tokio::test]
    async fn busy_port_restores_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let port = free_port();
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = blocker.local_addr().unwrap().port();

        let mut controller = ReloadController::new(static_config(port, "/", dir.path()), LogBuffer::default());
        controller.start().await.unwrap();

        let err = controller.reload(static_config(busy, "/", dir.path())).await.unwrap_err();
        assert!(matches!(err, StartError::Listener(ListenerError::Bind { .. })));

        let status = controller.status();
        assert_eq!(status.state, ControllerState::Running);
        assert_eq!(status.local_addr.unwrap().port(), port);
        assert_eq!(controller.config().port, port);
        assert_eq!(status_of(format!("http://127.0.0.1:{port}/a.txt")).await, 200);
        controller.stop().await;
    }

    #[tokio::test]
    async fn limiter_survives_reload_with_new_max_for_new_sources() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let mut config = static_config(port, "/", dir.path());
        config.rate_limiting = Some(RateLimitConfig {
            max_requests: 2,
            refill_interval_ms: 60_000,
        });

        let mut controller = ReloadController::new(config.clone(), LogBuffer::default());
        controller.start().await.unwrap();
        let limiter = controller.limiter().clone();
        let seen: std::net::IpAddr = "10.1.1.1".parse().unwrap();
        assert!(limiter.try_acquire(seen));

        config.rate_limiting = Some(RateLimitConfig {
            max_requests: 10,
            refill_interval_ms: 60_000,
        });
        controller.reload(config).await.unwrap();

        assert!(Arc::ptr_eq(&limiter, controller.limiter()));
        assert_eq!(limiter.tokens(seen), Some(1));
        assert_eq!(limiter.max_requests(), 10);
        controller.stop().await;
    }

    #[tokio::test]
    async fn reload_applies_new_log_level() {
        let (logging, _guard) = crate::observability::logging::scoped_logging("info");
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();

        let mut config = static_config(port, "/", dir.path());
        config.observability.log_level = "warn".into();
        let mut controller = ReloadController::new(config.clone(), LogBuffer::default()).with_logging(logging.clone());
        controller.start().await.unwrap();
        assert!(logging.filter().unwrap().contains("gatehouse=warn"));

        config.observability.log_level = "debug".into();
        controller.reload(config).await.unwrap();
        assert!(logging.filter().unwrap().contains("gatehouse=debug"));
        controller.stop().await;
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let controller = ReloadController::new(static_config(port, "/", dir.path()), LogBuffer::default());
        let mut status = controller.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(controller.run(rx, async move {
            let _ = stop_rx.await;
        }));

        status
            .wait_for(|s| s.state == ControllerState::Running)
            .await
            .unwrap();
        drop(tx);
        stop_tx.send(()).unwrap();

        task.await.unwrap().unwrap();
        assert!(reqwest::get(format!("http://127.0.0.1:{port}/")).await.is_err());
    }
}
