//! HTTP Proxy Bridge
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     HTTP BRIDGE                      │
//!   Client        │  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//!  ───────────────┼─▶│   net    │──▶│   http   │──▶│      bridge      │  │
//!   GET / CONNECT │  │ listener │   │ request  │   │ forward / tunnel │  │
//!                 │  └──────────┘   └──────────┘   └────────┬─────────┘  │
//!                 │                                         │            │
//!                 │                   dial → cork → transform → token    │
//!                 │                                         │            │
//!                 └─────────────────────────────────────────┼────────────┘
//!                                                           ▼
//!                                                        Upstream
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use http_bridge::bridge::{PlainTransform, TextDestination};
use http_bridge::config::{load_config, BridgeConfig, ObservabilityConfig};
use http_bridge::{lifecycle, observability};

#[derive(Debug, Parser)]
#[command(name = "http-bridge")]
#[command(about = "Local HTTP proxy that bridges requests onto an upstream transport", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client-facing listen address (overrides listener.bind_address)
    #[arg(short, long)]
    listen: Option<String>,

    /// Upstream address (overrides upstream.address)
    #[arg(short, long)]
    upstream: Option<String>,

    /// Fixed User-Agent for forwarded requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Coalesce small upstream writes
    #[arg(long)]
    cork: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(upstream) = self.upstream {
            config.upstream.address = upstream;
        }
        if self.user_agent.is_some() {
            config.upstream.user_agent = self.user_agent;
        }
        if self.cork {
            config.cork.enabled = true;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                let mut logging = ObservabilityConfig::default();
                if let Some(level) = &cli.log_level {
                    logging.log_level = level.clone();
                }
                observability::init_logging(&logging);
                tracing::error!(path = %path.display(), error = %err, "Failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => BridgeConfig::default(),
    };
    let config = cli.apply(config);

    match lifecycle::run(config, Arc::new(PlainTransform), Arc::new(TextDestination)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "http-bridge failed");
            ExitCode::FAILURE
        }
    }
}
