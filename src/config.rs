//! Configuration loading from environment variables.
//!
//! Every value has a default; missing or unparsable variables fall back to it
//! without failing. Command-line flags override what is loaded here.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CALC_RELAY_SERVER_HOST` | 127.0.0.1 | Compute server bind host |
//! | `CALC_RELAY_SERVER_PORT` | 5555 | Compute server bind port |
//! | `CALC_RELAY_PROXY_HOST` | 127.0.0.1 | Proxy bind host |
//! | `CALC_RELAY_PROXY_PORT` | 5554 | Proxy bind port |
//! | `CALC_RELAY_UPSTREAM_HOST` | 127.0.0.1 | Compute server address used by the proxy |
//! | `CALC_RELAY_UPSTREAM_PORT` | 5555 | Compute server port used by the proxy |
//! | `CALC_RELAY_CACHE_SIZE` | 128 | LRU capacity (server and proxy) |
//! | `CALC_RELAY_MAX_CONNECTIONS` | 64 | Concurrent client connections |
//! | `CALC_RELAY_MAX_FRAME_BYTES` | 1048576 | Largest accepted frame |
//! | `CALC_RELAY_IDLE_TIMEOUT_SECS` | 300 | Idle client timeout, 0 disables |
//! | `CALC_RELAY_UPSTREAM_CONNECT_TIMEOUT_SECS` | 3 | Proxy connect timeout |
//! | `CALC_RELAY_UPSTREAM_READ_TIMEOUT_SECS` | 3 | Proxy forward timeout |
//! | `CALC_RELAY_SHUTDOWN_TIMEOUT_SECS` | 5 | Drain timeout on Ctrl-C |
//! | `CALC_RELAY_LOG` | info | Log filter (falls back to `RUST_LOG`) |
//! | `CALC_RELAY_LOG_FORMAT` | json | `json` or `pretty` |
//! | `CALC_RELAY_LOG_FILE` | unset | Write JSON logs to this file |
//! | `CALC_RELAY_COMPLETION_URL` | https://openrouter.ai/api/v1 | Chat completions base URL |
//! | `CALC_RELAY_COMPLETION_MODEL` | openai/gpt-oss-20b:free | Completion model |
//! | `CALC_RELAY_COMPLETION_TIMEOUT_SECS` | 60 | Completion request timeout |
//! | `OPENROUTER_API_KEY` | unset | Bearer key for the completion API |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_CACHE_SIZE;
use crate::completion::{CompletionConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::net::{ListenerConfig, DEFAULT_MAX_CONNECTIONS};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 5555;
pub const DEFAULT_PROXY_PORT: u16 = 5554;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("{host}:{port} resolved to no addresses")]
    NoAddress { host: String, port: u16 },
}

/// A host and port, resolved lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to the first address the host maps to.
    pub async fn resolve(&self) -> Result<SocketAddr, ConfigError> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| ConfigError::Resolve {
                host: self.host.clone(),
                port: self.port,
                source,
            })?;
        addrs.next().ok_or_else(|| ConfigError::NoAddress {
            host: self.host.clone(),
            port: self.port,
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Proxy-only settings.
#[derive(Debug, Clone)]
pub struct ProxyEnvConfig {
    pub listen: Endpoint,
    pub upstream: Endpoint,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub server: Endpoint,
    pub proxy: ProxyEnvConfig,
    pub cache_size: usize,
    pub listener: ListenerConfig,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
    pub completion: CompletionConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u16` env var, returning `default` on missing or invalid.
fn parse_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u16>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a non-empty string env var.
fn parse_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn load_listener_config() -> ListenerConfig {
    const MIN_FRAME: usize = 1024;
    let max_connections = parse_usize("CALC_RELAY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS).max(1);
    let max_frame_bytes =
        parse_usize("CALC_RELAY_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES).max(MIN_FRAME);
    let idle_secs = parse_u64("CALC_RELAY_IDLE_TIMEOUT_SECS", 300);
    ListenerConfig {
        max_connections,
        max_frame_bytes,
        idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
    }
}

fn load_proxy_config() -> ProxyEnvConfig {
    let connect_secs = parse_u64("CALC_RELAY_UPSTREAM_CONNECT_TIMEOUT_SECS", 3).max(1);
    let read_secs = parse_u64("CALC_RELAY_UPSTREAM_READ_TIMEOUT_SECS", 3).max(1);
    ProxyEnvConfig {
        listen: Endpoint::new(
            parse_string("CALC_RELAY_PROXY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            parse_u16("CALC_RELAY_PROXY_PORT", DEFAULT_PROXY_PORT),
        ),
        upstream: Endpoint::new(
            parse_string("CALC_RELAY_UPSTREAM_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            parse_u16("CALC_RELAY_UPSTREAM_PORT", DEFAULT_SERVER_PORT),
        ),
        connect_timeout: Duration::from_secs(connect_secs),
        read_timeout: Duration::from_secs(read_secs),
    }
}

fn load_log_config() -> LogConfig {
    let level = parse_string("CALC_RELAY_LOG")
        .or_else(|| parse_string("RUST_LOG"))
        .unwrap_or_else(|| "info".to_string());
    let format = parse_string("CALC_RELAY_LOG_FORMAT")
        .and_then(|val| val.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level,
        file: parse_string("CALC_RELAY_LOG_FILE").map(PathBuf::from),
    }
}

fn load_completion_config() -> CompletionConfig {
    let timeout_secs = parse_u64("CALC_RELAY_COMPLETION_TIMEOUT_SECS", 60).max(1);
    CompletionConfig {
        base_url: parse_string("CALC_RELAY_COMPLETION_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        model: parse_string("CALC_RELAY_COMPLETION_MODEL")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        api_key: parse_string("OPENROUTER_API_KEY"),
        timeout: Duration::from_secs(timeout_secs),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to defaults without panicking.
pub fn load() -> EnvConfig {
    let shutdown_secs = parse_u64("CALC_RELAY_SHUTDOWN_TIMEOUT_SECS", 5).max(1);

    EnvConfig {
        server: Endpoint::new(
            parse_string("CALC_RELAY_SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            parse_u16("CALC_RELAY_SERVER_PORT", DEFAULT_SERVER_PORT),
        ),
        proxy: load_proxy_config(),
        cache_size: parse_usize("CALC_RELAY_CACHE_SIZE", DEFAULT_CACHE_SIZE).max(1),
        listener: load_listener_config(),
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        log: load_log_config(),
        completion: load_completion_config(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "CALC_RELAY_SERVER_HOST",
        "CALC_RELAY_SERVER_PORT",
        "CALC_RELAY_PROXY_HOST",
        "CALC_RELAY_PROXY_PORT",
        "CALC_RELAY_UPSTREAM_HOST",
        "CALC_RELAY_UPSTREAM_PORT",
        "CALC_RELAY_CACHE_SIZE",
        "CALC_RELAY_MAX_CONNECTIONS",
        "CALC_RELAY_MAX_FRAME_BYTES",
        "CALC_RELAY_IDLE_TIMEOUT_SECS",
        "CALC_RELAY_UPSTREAM_CONNECT_TIMEOUT_SECS",
        "CALC_RELAY_UPSTREAM_READ_TIMEOUT_SECS",
        "CALC_RELAY_SHUTDOWN_TIMEOUT_SECS",
        "CALC_RELAY_LOG",
        "CALC_RELAY_LOG_FORMAT",
        "CALC_RELAY_LOG_FILE",
        "CALC_RELAY_COMPLETION_URL",
        "CALC_RELAY_COMPLETION_MODEL",
        "CALC_RELAY_COMPLETION_TIMEOUT_SECS",
        "OPENROUTER_API_KEY",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.server, Endpoint::new("127.0.0.1", 5555));
        assert_eq!(cfg.proxy.listen, Endpoint::new("127.0.0.1", 5554));
        assert_eq!(cfg.proxy.upstream, Endpoint::new("127.0.0.1", 5555));
        assert_eq!(cfg.proxy.connect_timeout.as_secs(), 3);
        assert_eq!(cfg.proxy.read_timeout.as_secs(), 3);
        assert_eq!(cfg.cache_size, 128);
        assert_eq!(cfg.listener.max_connections, 64);
        assert_eq!(cfg.listener.max_frame_bytes, 1024 * 1024);
        assert_eq!(cfg.listener.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(cfg.shutdown_timeout.as_secs(), 5);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.log.file.is_none());
        assert_eq!(cfg.completion.model, DEFAULT_MODEL);
        assert!(cfg.completion.api_key.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CALC_RELAY_SERVER_PORT", "6000");
        std::env::set_var("CALC_RELAY_UPSTREAM_HOST", "compute.internal");
        std::env::set_var("CALC_RELAY_CACHE_SIZE", "512");
        std::env::set_var("CALC_RELAY_MAX_CONNECTIONS", "128");
        std::env::set_var("CALC_RELAY_LOG_FORMAT", "pretty");
        std::env::set_var("OPENROUTER_API_KEY", "sk-test");
        let cfg = load();
        assert_eq!(cfg.server.port, 6000);
        assert_eq!(cfg.proxy.upstream.host, "compute.internal");
        assert_eq!(cfg.cache_size, 512);
        assert_eq!(cfg.listener.max_connections, 128);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.completion.api_key.as_deref(), Some("sk-test"));
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CALC_RELAY_SERVER_PORT", "99999");
        std::env::set_var("CALC_RELAY_CACHE_SIZE", "lots");
        std::env::set_var("CALC_RELAY_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.server.port, 5555);
        assert_eq!(cfg.cache_size, 128);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_and_disabled_idle_timeout() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CALC_RELAY_CACHE_SIZE", "0");
        std::env::set_var("CALC_RELAY_MAX_FRAME_BYTES", "1");
        std::env::set_var("CALC_RELAY_IDLE_TIMEOUT_SECS", "0");
        let cfg = load();
        assert_eq!(cfg.cache_size, 1);
        assert!(cfg.listener.max_frame_bytes >= 1024, "frame limit must have floor");
        assert!(cfg.listener.idle_timeout.is_none());
        clear_env_vars();
    }

    #[test]
    fn test_log_filter_falls_back_to_rust_log() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("RUST_LOG", "calc_relay=debug");
        assert_eq!(load().log.level, "calc_relay=debug");
        std::env::set_var("CALC_RELAY_LOG", "warn");
        assert_eq!(load().log.level, "warn");
        clear_env_vars();
    }

    #[tokio::test]
    async fn test_endpoint_resolves_loopback() {
        let addr = Endpoint::new("127.0.0.1", 5555).resolve().await.unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 5555)));
        assert_eq!(Endpoint::new("localhost", 1).to_string(), "localhost:1");
    }
}
