//! Configuration types and constants for the sociable-web server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub(crate) const DEFAULT_SETTLE_MS: u64 = 250;
pub(crate) const MAX_WS_CONNECTIONS: usize = 8;
/// Header carrying the signed-in user's id, set by the auth front end.
pub(crate) const VIEWER_HEADER: &str = "x-user-id";

/// HTTP and WebSocket server for sociable.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "sociable-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: SOCIABLE_WEB_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory holding the database [env: SOCIABLE_HOME] [default: ~/.sociable]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Quiet period before a chat-list watcher refreshes [env: SOCIABLE_SETTLE_MS] [default: 250]
    #[arg(long)]
    pub settle_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub settle: Duration,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("SOCIABLE_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".sociable"))
                    .unwrap_or_else(|_| PathBuf::from(".sociable"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("SOCIABLE_WEB_BIND").ok())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let settle_ms = cli
            .settle_ms
            .or_else(|| {
                std::env::var("SOCIABLE_SETTLE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_SETTLE_MS);

        Self {
            bind_addr,
            data_dir,
            settle: Duration::from_millis(settle_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win() {
        let cli = Cli {
            bind: Some("0.0.0.0:8080".to_string()),
            data_dir: Some(PathBuf::from("/tmp/sociable-test")),
            settle_ms: Some(40),
        };
        let config = Config::from_cli_and_env(cli);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sociable-test"));
        assert_eq!(config.settle, Duration::from_millis(40));
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["sociable-web", "--bind", "127.0.0.1:9", "--settle-ms", "10"]);
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9"));
        assert_eq!(cli.settle_ms, Some(10));
        assert!(cli.data_dir.is_none());
    }
}
