//! Command-line and environment configuration.
//!
//! Each setting resolves CLI flag, then environment variable, then default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::net::{Endpoint, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_SERVER: &str = "127.0.0.1:9527";

const LOG_FILE_NAME: &str = "chat-client.log";

#[derive(Parser, Debug)]
#[command(name = "chatroom", version, about = "Interactive chatroom console client")]
pub struct Cli {
    /// Server endpoint: host:port, or unix:/path/to.sock
    #[arg(long, short, env = "CHATROOM_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Seconds to wait for each server response.
    #[arg(
        long,
        short,
        env = "CHATROOM_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Diagnostic log file (defaults to the user cache directory).
    #[arg(long, env = "CHATROOM_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Resolved client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub request_timeout: Duration,
    pub log_file: PathBuf,
}

impl ClientConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let endpoint = cli
            .server
            .parse::<Endpoint>()
            .with_context(|| format!("Invalid server endpoint '{}'", cli.server))?;

        Ok(Self {
            endpoint,
            request_timeout: Duration::from_secs(cli.timeout),
            log_file: cli.log_file.clone().unwrap_or_else(default_log_path),
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp(DEFAULT_SERVER.to_string()),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_file: default_log_path(),
        }
    }
}

/// `<cache dir>/chatroom/chat-client.log`, or the temp dir when the platform
/// has no cache dir.
pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chatroom")
        .join(LOG_FILE_NAME)
}
