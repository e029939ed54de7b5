//! CLI entry point for the Outlook JSON-RPC bridge: flag/config parsing,
//! adapter selection, and the two thin transports (stdio, HTTP) that sit on
//! top of `obridge_server`'s request pipeline. See spec §6.

#![forbid(unsafe_code)]

pub mod config_loader;
pub mod factory;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use obridge_core::config::Config;
use obridge_server::ServerContext;
use tracing_subscriber::EnvFilter;

use factory::AdapterKind;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] obridge_core::Error),
    #[error("adapter unavailable: {0}")]
    Adapter(String),
}

/// `obridge` — an Outlook JSON-RPC bridge server. Every flag here names the
/// config knob it sets (spec §6); unset flags fall back to the environment,
/// then an optional `--config` file, then the built-in default.
#[derive(Parser, Debug)]
#[command(name = "obridge", version, about = "Outlook JSON-RPC bridge server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional TOML config file, layered beneath environment variables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub host: Option<String>,
    #[arg(long, global = true)]
    pub port: Option<u16>,
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,
    #[arg(long = "max-concurrent-requests", global = true)]
    pub max_concurrent_requests: Option<usize>,
    #[arg(long = "request-timeout-ms", global = true)]
    pub request_timeout_ms: Option<u64>,
    #[arg(long = "shutdown-grace-ms", global = true)]
    pub shutdown_grace_ms: Option<u64>,
    #[arg(long = "strict-startup", global = true)]
    pub strict_startup: Option<bool>,

    /// Which `MailAdapter` backs the connection pool.
    #[arg(long, value_enum, global = true, default_value_t = AdapterKind::Auto)]
    pub adapter: AdapterKind,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve one session over stdin/stdout, one JSON-RPC frame per line.
    #[command(name = "serve-stdio")]
    ServeStdio,
    /// Serve over HTTP: `POST /mcp`, `GET /health`.
    #[command(name = "serve-http")]
    ServeHttp,
}

/// Parses arguments, runs the server, and returns the process exit code
/// (spec §6: 0 clean, 1 startup failure, 2 runtime fatal).
#[must_use]
pub fn run() -> i32 {
    let cli = Cli::parse();
    match try_run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("obridge: {err}");
            1
        }
    }
}

fn try_run(cli: Cli) -> Result<i32, CliError> {
    let _ = dotenvy::dotenv();
    let config = config_loader::build_config(&cli)?;
    init_logging(&config.log_level);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(cli.command, cli.adapter, config))
}

async fn run_server(command: Commands, adapter: AdapterKind, config: Config) -> Result<i32, CliError> {
    let factory = factory::build_factory(adapter).map_err(CliError::Adapter)?;
    let host = config.server_host.clone();
    let port = config.server_port;
    let ctx = ServerContext::new(config, factory);

    if let Err(err) = ctx.start().await {
        tracing::error!(error = %err, "startup failed");
        return Ok(1);
    }

    let result = match command {
        Commands::ServeStdio => transport::stdio::serve(Arc::clone(&ctx)).await,
        Commands::ServeHttp => transport::http::serve(Arc::clone(&ctx), host, port).await,
    };
    ctx.shutdown().await;

    match result {
        Ok(()) => Ok(0),
        Err(err) => {
            tracing::error!(error = %err, "runtime fatal");
            Ok(2)
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
