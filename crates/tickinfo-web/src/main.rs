use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tickinfo_core::{Resolver, ServiceConfig};
use tickinfo_web::{app, ServerError};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Field-level resolution service for ticker metrics.
///
/// Flags override the `TICKINFO_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "tickinfo-web", author, version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path of the JSON-lines cache file.
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Whole-entity cache time-to-live in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    cache_ttl_secs: Option<u64>,

    /// Per-provider call timeout in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    provider_timeout_ms: Option<u64>,
}

impl Cli {
    fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::from_env();
        if let Some(path) = &self.cache_path {
            config.cache_path = path.clone();
        }
        if let Some(secs) = self.cache_ttl_secs {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(millis) = self.provider_timeout_ms {
            config.provider_timeout = Duration::from_millis(millis);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = cli.config();
    info!(
        cache_path = %config.cache_path.display(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        provider_timeout_ms = config.provider_timeout.as_millis() as u64,
        "starting tickinfo"
    );

    let resolver = Arc::new(Resolver::from_config(&config));
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .map_err(|source| ServerError::Bind {
            address: cli.bind,
            source,
        })?;
    info!(address = %cli.bind, "listening");

    axum::serve(listener, app(resolver))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
