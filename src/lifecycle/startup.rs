//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging
//! - Validate configuration
//! - Build the bridge and bind the listener
//! - Serve until a shutdown signal, then drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::bridge::{Bridge, DestinationEncoder, Transform};
use crate::config::{validate_config, BridgeConfig, ValidationError};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::observability;

/// Errors that stop the bridge from starting or serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs the bridge with the given upstream collaborators until shut down.
pub async fn run(
    config: BridgeConfig,
    transform: Arc<dyn Transform>,
    encoder: Arc<dyn DestinationEncoder>,
) -> Result<(), StartupError> {
    observability::init_logging(&config.observability);

    validate_config(&config).map_err(StartupError::Config)?;
    let bridge = Bridge::from_config(&config, transform, encoder)
        .map_err(|err| StartupError::Config(vec![err]))?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        cork = config.cork.enabled,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    HttpServer::new(&config, Arc::new(bridge))
        .run(listener, receiver)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
