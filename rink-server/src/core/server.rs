//! Server Implementation
//!
//! HTTP 服务器启动和管理

use std::time::Duration;

use crate::core::{Config, ServerState};
use crate::tickets::sweeper;
use crate::utils::{AppError, AppResult};

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (for tests and embedding)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> AppResult<()> {
        // Create application state if not provided
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await?,
        };

        // Periodic expiry sweep (optional; the /sweep endpoint always works)
        if self.config.sweep_interval_secs > 0 {
            let sweep_state = state.clone();
            let interval = Duration::from_secs(self.config.sweep_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    match sweeper::sweep(
                        &sweep_state.pool,
                        sweep_state.clock.as_ref(),
                        sweep_state.config.base_session_minutes,
                    )
                    .await
                    {
                        Ok(expired) if !expired.is_empty() => {
                            tracing::info!(count = expired.len(), "Background sweep expired tickets");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("Background sweep failed: {}", e),
                    }
                }
            });
            tracing::info!(
                interval_secs = self.config.sweep_interval_secs,
                "Background expiry sweep enabled"
            );
        }

        let app = crate::api::router().with_state(state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        tracing::info!("⛸  Rink Edge Server starting on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down...");
            })
            .await
            .map_err(|e| AppError::internal(format!("Server error: {e}")))
    }
}
