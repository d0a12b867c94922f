//! HTTP transport for the comet relay engine.
//!
//! Exposes the engine over an axum [`axum::Router`]:
//!
//! | Endpoint | Purpose                                     |
//! |----------|---------------------------------------------|
//! | `/sub`   | Park a long poll or replay the recent ring  |
//! | `/pub`   | Publish a message to a channel              |
//! | `/sign`  | Admit or refresh a named channel            |
//! | `/close` | Terminate a channel                         |
//! | `/ping`  | Liveness probe carrying the poll timeout    |
//! | `/info`  | Channel or global statistics                |
//! | `/check` | Channel liveness check                      |
//!
//! Parked `/sub` responses are chunked: frames are streamed as the engine
//! delivers them and the response ends when the subscriber is detached.
//! Client disconnects are reported back to the engine by a guard on the
//! response body.

mod body;
mod handlers;
mod query;
mod state;

pub use handlers::router;
pub use state::{RelayState, run_sweeper};

use std::net::SocketAddr;
use std::sync::Arc;

use comet_core::{ConfigError, EngineConfig};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Problem while starting or running the relay server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for the relay HTTP server.
#[derive(Debug, Default)]
pub struct RelayServerBuilder {
    config: EngineConfig,
}

impl RelayServerBuilder {
    /// Create a builder with the given engine configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Build the shared server state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn build(self) -> Result<Arc<RelayState>, ConfigError> {
        self.config.validate()?;
        Ok(Arc::new(RelayState::new(self.config)))
    }

    /// Build the state and create the axum router.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn into_router(self) -> Result<axum::Router, ConfigError> {
        Ok(router(self.build()?))
    }
}

/// Bind `addr`, spawn the sweeper, and serve until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener cannot
/// be bound or served.
pub async fn serve(
    addr: SocketAddr,
    config: EngineConfig,
    cancel: CancellationToken,
) -> Result<(), ServeError> {
    let state = RelayServerBuilder::new(config).build()?;
    let app = router(state.clone());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("relay listening on {addr}");

    tokio::spawn(run_sweeper(state, cancel.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
