// Configuration structures, loaded from framesync.toml
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "framesync.toml";
pub const CONFIG_PATH_ENV: &str = "FRAMESYNC_CONFIG";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("frame_buffer_size must be at least 1")]
    EmptyFrameBuffer,

    #[error("channel_depth must be at least 1")]
    EmptyChannel,

    #[error("recv_buffer_size must be at least 1")]
    EmptyRecvBuffer,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.frame_buffer_size == 0 {
            return Err(ConfigError::EmptyFrameBuffer);
        }
        if self.transport.channel_depth == 0 {
            return Err(ConfigError::EmptyChannel);
        }
        if self.transport.recv_buffer_size == 0 {
            return Err(ConfigError::EmptyRecvBuffer);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_frame_buffer_size")]
    pub frame_buffer_size: usize,
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_server_bind_address(),
            port: default_server_port(),
            tick_interval_ms: default_tick_interval_ms(),
            frame_buffer_size: default_frame_buffer_size(),
            client_timeout_secs: default_client_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Depth of the inbound and outbound message queues.
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,
    /// Largest datagram the reader accepts; longer ones are truncated by the OS.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_depth: default_channel_depth(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_client_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default = "default_input_interval_ms")]
    pub input_interval_ms: u64,
    #[serde(default = "default_rejoin_interval_ms")]
    pub rejoin_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            bind_address: default_client_bind_address(),
            server_address: default_server_address(),
            input_interval_ms: default_input_interval_ms(),
            rejoin_interval_ms: default_rejoin_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TracingConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            level: default_level(),
        }
    }
}

fn default_server_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    7788
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_frame_buffer_size() -> usize {
    128
}

fn default_client_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3
}

fn default_channel_depth() -> usize {
    128
}

fn default_recv_buffer_size() -> usize {
    1024
}

fn default_username() -> String {
    "TestClient".to_string()
}

fn default_client_bind_address() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_server_address() -> String {
    "127.0.0.1:7788".to_string()
}

fn default_input_interval_ms() -> u64 {
    50
}

fn default_rejoin_interval_ms() -> u64 {
    1000
}

fn default_format() -> String {
    "compact".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

/// Path of the configuration file: `FRAMESYNC_CONFIG` if set, else `framesync.toml`.
pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

// Load configuration, falling back to defaults when the file is missing or broken.
// Runs before the subscriber is installed, so notices go to stderr.
pub fn load_config(path: impl AsRef<Path>) -> Config {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                eprintln!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Failed to parse {}: {}", path.display(), e);
                eprintln!("Using default configuration");
                Config::default()
            }
        },
        Err(_) => {
            eprintln!("{} not found, using default configuration", path.display());
            Config::default()
        }
    }
}
