use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::EngineConfig;
use courier_core::service::SessionService;
use courier_core::submission::SubmissionStore;
use eyre::{Result, eyre};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::Command;
use crate::http::{AppState, build_app};

const REAPER_PERIOD: Duration = Duration::from_secs(60);

pub struct ServeCommand {
    pub config: EngineConfig,
}

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self) -> Result<()> {
        let server = &self.config.server;
        let addr: SocketAddr = format!("{}:{}", server.bind, server.port)
            .parse()
            .map_err(|e| eyre!("Invalid bind address: {}", e))?;

        let service = SessionService::simulated(&self.config);
        let state = AppState::new(
            service.clone(),
            SubmissionStore::new(&self.config.submissions_dir),
        );
        let app = build_app(state, server.request_timeout_secs);

        let reaper = self
            .config
            .stopped_retention()
            .map(|ttl| spawn_reaper(service.clone(), ttl));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        let stopped = service.stop_all()?;
        info!(stopped, "Server stopped");

        Ok(())
    }
}

/// Periodically drop stopped sessions older than `ttl`.
fn spawn_reaper(service: SessionService, ttl: Duration) -> JoinHandle<()> {
    info!(ttl_secs = ttl.as_secs(), "Stopped-session reaper enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAPER_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.evict_stopped(ttl) {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "Evicted stopped sessions"),
                Err(e) => warn!(error = %e, "Failed to evict stopped sessions"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown signal received");
}
