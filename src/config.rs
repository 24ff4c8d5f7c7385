//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::backend::{BackingClient, MemoryClient};
use crate::error::{Result, StoreError};
use crate::store::{AdapterOptions, StoreAdapter};

/// Replace `$NAME` and `${NAME}` with the value of the environment variable
/// (empty when unset). Substituted values are not expanded again, and an
/// unterminated `${` is kept as written.
fn expand_env_vars(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(dollar) = rest.find('$') {
    out.push_str(&rest[..dollar]);
    let after = &rest[dollar + 1..];

    if let Some(braced) = after.strip_prefix('{') {
      let Some(close) = braced.find('}') else {
        out.push_str(&rest[dollar..]);
        return out;
      };
      out.push_str(&env_value(&braced[..close]));
      rest = &braced[close + 1..];
      continue;
    }

    let name_len = after
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(after.len());
    if name_len == 0 {
      out.push('$');
    } else {
      out.push_str(&env_value(&after[..name_len]));
    }
    rest = &after[name_len..];
  }

  out.push_str(rest);
  out
}

fn env_value(name: &str) -> String {
  std::env::var(name).unwrap_or_default()
}

/// Which backing client to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
  /// In-process store (default)
  #[default]
  Memory,
  /// External Redis server
  Redis,
}

impl std::fmt::Display for BackendMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BackendMode::Memory => write!(f, "memory"),
      BackendMode::Redis => write!(f, "redis"),
    }
  }
}

impl std::str::FromStr for BackendMode {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "memory" | "inmemory" | "builtin" => Ok(BackendMode::Memory),
      "redis" | "external" => Ok(BackendMode::Redis),
      _ => Err(format!("Unknown backend mode: {}", s)),
    }
  }
}

/// Connection settings for an external Redis server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_redis_port")]
  pub port: u16,

  #[serde(default)]
  pub password: Option<String>,

  /// Redis database number
  #[serde(default)]
  pub database: u8,

  #[serde(default)]
  pub tls_enabled: bool,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

impl Default for RedisConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_redis_port(),
      password: None,
      database: 0,
      tls_enabled: false,
    }
  }
}

impl RedisConfig {
  /// Generate Redis connection URL
  pub fn connection_url(&self) -> String {
    let scheme = if self.tls_enabled { "rediss" } else { "redis" };
    let auth = match &self.password {
      Some(pwd) if !pwd.is_empty() => format!(":{}@", pwd),
      _ => String::new(),
    };
    format!(
      "{}://{}{}:{}/{}",
      scheme, auth, self.host, self.port, self.database
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

fn default_server_environment() -> bool {
  true
}

/// Top-level store configuration, usually read from `sqrl-store.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
  #[serde(default)]
  pub mode: BackendMode,

  /// `false` builds an inert adapter (no connections, no I/O)
  #[serde(default = "default_server_environment")]
  pub server_environment: bool,

  #[serde(default)]
  pub redis: RedisConfig,

  #[serde(default)]
  pub logging: LoggingSection,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      mode: BackendMode::default(),
      server_environment: default_server_environment(),
      redis: RedisConfig::default(),
      logging: LoggingSection::default(),
    }
  }
}

impl StoreConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
      StoreError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
    })?;
    Self::from_yaml(&content)
  }

  /// Parse YAML after expanding `$VAR` / `${VAR}` references
  pub fn from_yaml(content: &str) -> Result<Self> {
    let expanded = expand_env_vars(content);
    serde_yaml::from_str(&expanded).map_err(|e| StoreError::Config(e.to_string()))
  }

  pub fn find_and_load() -> Result<Option<Self>> {
    for p in ["sqrl-store.yaml", "sqrl-store.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn adapter_options(&self) -> AdapterOptions {
    AdapterOptions {
      server_environment: self.server_environment,
    }
  }

  /// Build the configured backing client and wrap it in a [`StoreAdapter`].
  /// Outside a server environment no connection is attempted.
  pub async fn connect(&self) -> Result<StoreAdapter> {
    if !self.server_environment {
      return Ok(StoreAdapter::inert());
    }
    let client = self.backing_client().await?;
    StoreAdapter::new(client, self.adapter_options()).await
  }

  async fn backing_client(&self) -> Result<Arc<dyn BackingClient>> {
    match self.mode {
      BackendMode::Memory => {
        tracing::info!("Using in-memory store backend");
        Ok(Arc::new(MemoryClient::new()))
      }
      #[cfg(feature = "server")]
      BackendMode::Redis => {
        let client = crate::backend::RedisClient::connect(&self.redis)
          .await
          .map_err(|e| StoreError::Backend(e.into()))?;
        tracing::info!(
          "Connected to Redis at {}:{}/{}",
          self.redis.host,
          self.redis.port,
          self.redis.database
        );
        Ok(Arc::new(client))
      }
      #[cfg(not(feature = "server"))]
      BackendMode::Redis => Err(StoreError::Config(
        "redis backend requires the `server` feature".to_string(),
      )),
    }
  }
}
