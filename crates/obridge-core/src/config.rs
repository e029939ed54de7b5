//! Configuration for the Outlook JSON-RPC bridge.
//!
//! Configuration is loaded from environment variables, following the same
//! "explicit beats auto beats default" precedence the connection pool uses
//! for its own sizing. A config file (TOML) may be loaded first by the CLI;
//! environment variables always win over the file (spec §6: "env overrides
//! file").

use std::time::Duration;

use crate::error::{Error, Result};

/// Tolerance applied when validating `EmailSummary::received_time` against
/// "now" — small clock skew between the bridge host and the mail store
/// should not make otherwise-valid data look invalid.
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(120);

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_value(name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env_value(name)
        .and_then(|s| match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    env_value(name)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Connection pool sizing and maintenance knobs. See spec §4.2.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub max_idle: Duration,
    pub max_age: Duration,
    pub probe_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 4,
            max_idle: Duration::from_secs(300),
            max_age: Duration::from_secs(3600),
            probe_interval: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_connections: env_parse("OUTLOOK_BRIDGE_POOL_MIN", d.min_connections),
            max_connections: env_parse("OUTLOOK_BRIDGE_POOL_MAX", d.max_connections),
            max_idle: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_POOL_MAX_IDLE_SECS",
                d.max_idle.as_secs(),
            )),
            max_age: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_POOL_MAX_AGE_SECS",
                d.max_age.as_secs(),
            )),
            probe_interval: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_POOL_PROBE_INTERVAL_SECS",
                d.probe_interval.as_secs(),
            )),
        }
    }
}

/// Token-bucket rate limiter knobs. See spec §4.3.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub rps: f64,
    pub burst: u32,
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 10.0,
            burst: 20,
            per_minute: Some(300),
            per_hour: Some(5000),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            rps: env_parse("OUTLOOK_BRIDGE_RATE_LIMIT_RPS", d.rps),
            burst: env_parse("OUTLOOK_BRIDGE_RATE_LIMIT_BURST", d.burst),
            per_minute: env_value("OUTLOOK_BRIDGE_RATE_LIMIT_PER_MINUTE")
                .and_then(|s| s.parse().ok())
                .or(d.per_minute),
            per_hour: env_value("OUTLOOK_BRIDGE_RATE_LIMIT_PER_HOUR")
                .and_then(|s| s.parse().ok())
                .or(d.per_hour),
        }
    }
}

/// Cache sizing and TTL knobs. See spec §4.4.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_bytes: u64,
    pub email_ttl: Duration,
    pub folder_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            email_ttl: Duration::from_secs(5 * 60),
            folder_ttl: Duration::from_secs(10 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_bytes: env_parse("OUTLOOK_BRIDGE_CACHE_MAX_BYTES", d.max_bytes),
            email_ttl: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_CACHE_EMAIL_TTL_SECS",
                d.email_ttl.as_secs(),
            )),
            folder_ttl: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_CACHE_FOLDER_TTL_SECS",
                d.folder_ttl.as_secs(),
            )),
            cleanup_interval: Duration::from_secs(env_parse(
                "OUTLOOK_BRIDGE_CACHE_CLEANUP_INTERVAL_SECS",
                d.cleanup_interval.as_secs(),
            )),
        }
    }
}

/// Security / policy knobs. See spec §6.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub allowed_folders: Vec<String>,
    pub blocked_folders: Vec<String>,
    pub max_email_size_bytes: Option<u64>,
    pub sanitize_html: bool,
}

impl SecurityConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            allowed_folders: env_list("OUTLOOK_BRIDGE_ALLOWED_FOLDERS"),
            blocked_folders: env_list("OUTLOOK_BRIDGE_BLOCKED_FOLDERS"),
            max_email_size_bytes: env_value("OUTLOOK_BRIDGE_MAX_EMAIL_SIZE_BYTES")
                .and_then(|s| s.parse().ok()),
            sanitize_html: env_bool("OUTLOOK_BRIDGE_SANITIZE_HTML", false),
        }
    }

    /// Whether a folder id is permitted under the allow/block lists.
    /// An empty `allowed_folders` list means "all folders allowed" unless
    /// explicitly blocked.
    #[must_use]
    pub fn folder_permitted(&self, folder_id: &str) -> bool {
        if self.blocked_folders.iter().any(|f| f == folder_id) {
            return false;
        }
        self.allowed_folders.is_empty() || self.allowed_folders.iter().any(|f| f == folder_id)
    }
}

/// Top-level server configuration. See spec §6 "Config knobs (enumerated)".
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub outlook_connection_timeout: Duration,
    pub shutdown_grace: Duration,
    pub strict_startup: bool,
    pub pool: PoolConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8765,
            log_level: "info".to_string(),
            max_concurrent_requests: 64,
            request_timeout: Duration::from_millis(10_000),
            outlook_connection_timeout: Duration::from_millis(5_000),
            shutdown_grace: Duration::from_secs(10),
            strict_startup: true,
            pool: PoolConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration purely from environment variables, falling back
    /// to the defaults above for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            server_host: env_value("OUTLOOK_BRIDGE_HOST").unwrap_or(d.server_host),
            server_port: env_parse("OUTLOOK_BRIDGE_PORT", d.server_port),
            log_level: env_value("OUTLOOK_BRIDGE_LOG_LEVEL").unwrap_or(d.log_level),
            max_concurrent_requests: env_parse(
                "OUTLOOK_BRIDGE_MAX_CONCURRENT_REQUESTS",
                d.max_concurrent_requests,
            ),
            request_timeout: Duration::from_millis(env_parse(
                "OUTLOOK_BRIDGE_REQUEST_TIMEOUT_MS",
                d.request_timeout.as_millis() as u64,
            )),
            outlook_connection_timeout: Duration::from_millis(env_parse(
                "OUTLOOK_BRIDGE_OUTLOOK_CONNECTION_TIMEOUT_MS",
                d.outlook_connection_timeout.as_millis() as u64,
            )),
            shutdown_grace: Duration::from_millis(env_parse(
                "OUTLOOK_BRIDGE_SHUTDOWN_GRACE_MS",
                d.shutdown_grace.as_millis() as u64,
            )),
            strict_startup: env_bool("OUTLOOK_BRIDGE_STRICT_STARTUP", d.strict_startup),
            pool: PoolConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            cache: CacheConfig::from_env(),
            security: SecurityConfig::from_env(),
        }
    }

    /// Merge a config file's values (lower precedence) underneath whatever
    /// environment variables already set. The CLI calls this after parsing
    /// the TOML file and before `from_env()`'s environment pass would run
    /// again; in practice the CLI calls `from_file` first and then
    /// overwrites with `from_env()`-sourced values explicitly present.
    pub fn apply_file_defaults(&mut self, raw: &str) -> Result<()> {
        let parsed: toml::Value =
            toml::from_str(raw).map_err(|e| Error::ConfigParse(e.to_string()))?;
        if let Some(host) = parsed.get("server_host").and_then(|v| v.as_str()) {
            self.server_host = host.to_string();
        }
        if let Some(port) = parsed.get("server_port").and_then(toml::Value::as_integer) {
            self.server_port = u16::try_from(port)
                .map_err(|_| Error::InvalidField {
                    field: "server_port",
                    message: "out of u16 range".to_string(),
                })?;
        }
        if let Some(n) = parsed
            .get("max_concurrent_requests")
            .and_then(toml::Value::as_integer)
        {
            self.max_concurrent_requests = usize::try_from(n).unwrap_or(self.max_concurrent_requests);
        }
        Ok(())
    }
}
