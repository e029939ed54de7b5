//! Layers configuration the way spec §6 describes: built-in defaults, then
//! an optional `--config` TOML file, then environment variables, then CLI
//! flags — each layer more explicit than the last, matching the
//! "explicit beats auto beats default" precedence `obridge_core::config`
//! already uses for the pool's own sizing.

use std::time::Duration;

use obridge_core::config::Config;

use crate::{Cli, CliError};

/// Builds the effective `Config` for one process run.
///
/// # Errors
/// Returns [`CliError::Config`] if `--config` points at a file that can't be
/// read or doesn't parse as TOML.
pub fn build_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::default();

    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path)?;
        config.apply_file_defaults(&raw)?;
    }

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, cli);

    Ok(config)
}

/// `Config::from_env()` falls back to the same built-in defaults the file
/// layer may have already overridden, so this only copies fields whose
/// environment variable is actually set, field by field, rather than
/// adopting the whole struct wholesale. The pool/rate-limit/cache/security
/// sub-configs have no file-layer equivalent, so those are always safe to
/// take from the environment pass as-is.
fn apply_env_overrides(config: &mut Config) {
    let from_env = Config::from_env();

    if std::env::var("OUTLOOK_BRIDGE_HOST").is_ok() {
        config.server_host = from_env.server_host;
    }
    if std::env::var("OUTLOOK_BRIDGE_PORT").is_ok() {
        config.server_port = from_env.server_port;
    }
    if std::env::var("OUTLOOK_BRIDGE_MAX_CONCURRENT_REQUESTS").is_ok() {
        config.max_concurrent_requests = from_env.max_concurrent_requests;
    }
    config.log_level = from_env.log_level;
    config.request_timeout = from_env.request_timeout;
    config.outlook_connection_timeout = from_env.outlook_connection_timeout;
    config.shutdown_grace = from_env.shutdown_grace;
    config.strict_startup = from_env.strict_startup;
    config.pool = from_env.pool;
    config.rate_limit = from_env.rate_limit;
    config.cache = from_env.cache;
    config.security = from_env.security;
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(n) = cli.max_concurrent_requests {
        config.max_concurrent_requests = n;
    }
    if let Some(ms) = cli.request_timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.shutdown_grace_ms {
        config.shutdown_grace = Duration::from_millis(ms);
    }
    if let Some(strict) = cli.strict_startup {
        config.strict_startup = strict;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::AdapterKind;
    use crate::Commands;

    fn base_cli() -> Cli {
        Cli {
            command: Commands::ServeStdio,
            config: None,
            host: None,
            port: None,
            log_level: None,
            max_concurrent_requests: None,
            request_timeout_ms: None,
            shutdown_grace_ms: None,
            strict_startup: None,
            adapter: AdapterKind::Auto,
        }
    }

    #[test]
    fn cli_flag_overrides_default() {
        let mut cli = base_cli();
        cli.port = Some(9999);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.server_port, 9999);
    }

    #[test]
    fn file_layer_is_overridden_by_cli_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_port = 1111\n").unwrap();

        let mut cli = base_cli();
        cli.config = Some(path.clone());
        let config = build_config(&cli).unwrap();
        assert_eq!(config.server_port, 1111);

        cli.port = Some(2222);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.server_port, 2222);
    }

    #[test]
    fn missing_config_file_is_reported_as_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = base_cli();
        cli.config = Some(dir.path().join("does-not-exist.toml"));
        assert!(matches!(build_config(&cli), Err(CliError::Io(_))));
    }
}
