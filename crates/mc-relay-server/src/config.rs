use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mc_relay_transport::{parse_ws_url, ConnectError, OverflowPolicy, TransportConfig};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key looked up in the process environment and in the env file.
pub const ENDPOINT_KEY: &str = "WEBSOCKET_SERVER";

/// Endpoint used when no source provides a usable URL.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3020";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin} holds an unusable endpoint {value:?}: {reason}")]
    InvalidUrl {
        origin: String,
        value: String,
        #[source]
        reason: ConnectError,
    },
}

// ─── relay.toml ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    #[serde(default)]
    pub overflow: Overflow,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_env_file() -> PathBuf {
    PathBuf::from("mods/player-viewer/.env")
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            outbox_capacity: default_outbox_capacity(),
            overflow: Overflow::default(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Overflow {
    #[default]
    DropOldest,
    DropWhenDisconnected,
}

impl RelaySection {
    /// Zero backoff values are rejected with a warning and replaced by the
    /// defaults.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            outbox_capacity: self.outbox_capacity.max(1),
            overflow: match self.overflow {
                Overflow::DropOldest => OverflowPolicy::DropOldest,
                Overflow::DropWhenDisconnected => OverflowPolicy::DropWhenDisconnected,
            },
            backoff_base: nonzero_ms(
                "backoff_base_ms",
                self.backoff_base_ms,
                default_backoff_base_ms(),
            ),
            backoff_cap: nonzero_ms(
                "backoff_cap_ms",
                self.backoff_cap_ms,
                default_backoff_cap_ms(),
            ),
        }
    }
}

fn nonzero_ms(key: &str, value: u64, default: u64) -> Duration {
    if value == 0 {
        warn!("[relay] {key} must be greater than zero, using {default}");
        return Duration::from_millis(default);
    }
    Duration::from_millis(value)
}

#[derive(Debug, Deserialize)]
pub struct HostSection {
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    #[serde(default = "default_players")]
    pub players: Vec<String>,
}

fn default_tick_rate() -> u32 {
    20
}

fn default_players() -> Vec<String> {
    vec!["Steve".into(), "Alex".into()]
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            players: default_players(),
        }
    }
}

impl HostSection {
    /// Time between ticks. A zero rate is treated as one tick per second.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RelayFileConfig {
    /// Load the config file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ─── Endpoint resolution ─────────────────────────────────────────────────────

/// Where the endpoint URL came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    Environment,
    EnvFile(PathBuf),
    Default,
}

/// Resolve the upstream URL: environment, then env file, then the default.
///
/// `from_env` is the value of [`ENDPOINT_KEY`] in the process environment.
/// Empty values are skipped; invalid ones are logged and skipped.
pub fn resolve_endpoint(from_env: Option<&str>, env_file: &Path) -> (String, EndpointSource) {
    if let Some(url) = usable(from_env, "environment variable WEBSOCKET_SERVER") {
        return (url, EndpointSource::Environment);
    }

    match read_env_file(env_file) {
        Ok(vars) => {
            let origin = format!("{ENDPOINT_KEY} in {}", env_file.display());
            if let Some(url) = usable(vars.get(ENDPOINT_KEY).map(String::as_str), &origin) {
                return (url, EndpointSource::EnvFile(env_file.to_path_buf()));
            }
        }
        Err(e) => debug!("{e}"),
    }

    info!("No {ENDPOINT_KEY} configured, using {DEFAULT_ENDPOINT}");
    (DEFAULT_ENDPOINT.to_string(), EndpointSource::Default)
}

fn usable(value: Option<&str>, origin: &str) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match parse_ws_url(value) {
        Ok(_) => Some(value.to_string()),
        Err(reason) => {
            let e = ConfigError::InvalidUrl {
                origin: origin.to_string(),
                value: value.to_string(),
                reason,
            };
            warn!("{e}");
            None
        }
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_env(&text))
}

/// Parse `key=value` / `key: value` lines. `#` and `!` start comment lines,
/// an optional `export ` prefix is ignored, and matching quotes are stripped.
pub fn parse_env(text: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some(split) = line.find(['=', ':']) else {
            continue;
        };
        let key = line[..split].trim();
        if key.is_empty() {
            continue;
        }
        let value = unquote(line[split + 1..].trim());
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
