//! cohort-server - HTTP surface for the cohort experiment engine
//!
//! This crate exposes the engine over axum: the goal tracking beacon, the
//! human-confirmation endpoint, assignment, and the experiment/report read
//! API. The engine itself lives in `cohort-core`; this layer owns the
//! shared [`AppState`] and the listener lifecycle.

mod config;
mod error;
pub mod http;
mod state;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use config::ServerConfig;
pub use error::ServerError;
pub use http::create_router;
pub use state::AppState;

/// The main cohort server
pub struct CohortServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl CohortServer {
    /// Create a server over existing state
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Open the configured database and create a server with default
    /// collaborators
    pub async fn open(config: ServerConfig) -> Result<Self, ServerError> {
        let state = Arc::new(AppState::open(&config).await?);
        Ok(Self { config, state })
    }

    /// Shared application state
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener =
            TcpListener::bind(self.config.bind)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: self.config.bind.to_string(),
                    source,
                })?;
        let router = create_router(self.state.clone());
        info!(addr = %self.config.bind, "cohort server listening");
        axum::serve(listener, router)
            .await
            .map_err(|error| ServerError::Internal(error.to_string()))
    }
}
