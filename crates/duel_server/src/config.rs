//! Server configuration.
//!
//! Layered: built-in defaults, then an optional TOML file, then command-line
//! flags and environment variables (see [`crate::cli::Cli`]).

use crate::cli::Cli;
use crate::coordinator::DEFAULT_SEND_QUEUE;
use crate::error::ConfigError;
use crate::registry::DEFAULT_ID_LEN;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Origins allowed by default outside production.
const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:3001",
];

/// Deployment environment; decides the default CORS origins.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Local development: localhost front-ends are allowed.
    #[default]
    Development,
    /// Production: only explicitly configured front-ends are allowed.
    Production,
}

/// Room server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// Deployment environment.
    environment: Environment,
    /// Extra browser origins allowed to open sockets.
    allowed_origins: Vec<String>,
    /// Length of generated session identifiers.
    session_id_len: usize,
    /// Outbound queue capacity per connection.
    send_queue: usize,
    /// Seconds between WebSocket pings.
    heartbeat_secs: u64,
    /// Seconds between sweeps for abandoned sessions.
    sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            environment: Environment::Development,
            allowed_origins: Vec::new(),
            session_id_len: DEFAULT_ID_LEN,
            send_queue: DEFAULT_SEND_QUEUE,
            heartbeat_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file; missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Resolves the effective configuration for a command line.
    #[instrument(skip(cli))]
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields given on the command line or in the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(environment) = cli.environment {
            self.environment = environment;
        }
        self.allowed_origins.extend(
            [&cli.app_url, &cli.frontend_url]
                .into_iter()
                .flatten()
                .filter(|origin| !origin.is_empty())
                .cloned(),
        );
        if let Some(len) = cli.session_id_len {
            self.session_id_len = len;
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id_len == 0 {
            return Err(ConfigError::new("session_id_len must be at least 1"));
        }
        if self.send_queue == 0 {
            return Err(ConfigError::new("send_queue must be at least 1"));
        }
        if self.heartbeat_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(ConfigError::new("intervals must be at least one second"));
        }
        Ok(())
    }

    /// Origins the CORS layer admits.
    ///
    /// Production admits only configured origins; development also admits
    /// the usual localhost front-end ports.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = match self.environment {
            Environment::Production => Vec::new(),
            Environment::Development => DEV_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };
        for origin in &self.allowed_origins {
            if !origins.contains(origin) {
                origins.push(origin.clone());
            }
        }
        origins
    }

    /// Interval between WebSocket pings.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Interval between abandoned-session sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Returns a copy bound to `port`; handy for tests binding port 0.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns a copy bound to `host`.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}
