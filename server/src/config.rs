use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::realtime::RealtimeSettings;

const DEFAULT_CONFIG_PATH: &str = "./ideaforge.toml";

/// IdeaForge real-time server
///
/// Every flag is optional: an omitted flag leaves the value from the TOML
/// file, the environment or the built-in default in place.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(
    name = "ideaforge-server",
    version,
    about = "IdeaForge chat and notification server"
)]
pub struct Cli {
    /// Port to listen on [default: 4000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./ideaforge.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Shared HS256 secret. When unset, a key is loaded from or generated into data_dir.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Seconds between heartbeat sweeps [default: 30]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,

    /// Per-session write deadline in milliseconds [default: 3000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,

    /// Frames buffered per session before writes start waiting [default: 64]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_buffer: Option<usize>,
}

/// Effective server configuration after every layer has been merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub write_timeout_ms: u64,
    pub session_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            heartbeat_interval_secs: 30,
            write_timeout_ms: 3000,
            session_buffer: 64,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (IDEAFORGE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(&Cli::parse()).extract()
    }

    /// The merged provider stack for the given command line.
    pub fn figment(cli: &Cli) -> Figment {
        let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("IDEAFORGE_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            write_timeout: Duration::from_millis(self.write_timeout_ms.max(1)),
            session_buffer: self.session_buffer.max(1),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# IdeaForge Server Configuration
# Place this file at ./ideaforge.toml or specify with --config <path>
# All settings can be overridden via environment variables (IDEAFORGE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT signing key
# data_dir = "./data"

# Shared HS256 secret used by the identity service that mints tokens.
# When unset, a random key is generated into data_dir/jwt_secret.
# jwt_secret = ""

# ---- Real-time delivery ----

# Seconds between heartbeats to chat and notification sessions
# heartbeat_interval_secs = 30

# Milliseconds a single session write may take before the session is evicted
# write_timeout_ms = 3000

# Frames buffered per session
# session_buffer = 64
"#
    .to_string()
}
