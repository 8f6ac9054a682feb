//! Server configuration, parsed from the command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Default path of the append-only log.
pub const DEFAULT_AOF_PATH: &str = "appendonly.aof";

#[derive(Parser, Debug, Clone)]
#[command(name = "driftkv", author, version, about, long_about = None)]
pub struct Config {
    /// Host to bind to.
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path of the append-only log replayed at startup.
    #[arg(long = "aof", value_name = "PATH", default_value = DEFAULT_AOF_PATH)]
    pub aof_path: PathBuf,

    /// Run purely in memory: no append log, no replay.
    #[arg(long)]
    pub no_aof: bool,

    /// Milliseconds between background expiry sweeps.
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_ms: u64,

    /// Maximum number of clients served at once.
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_connections: u32,

    /// Default log filter; RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Returns the bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The append log path, or `None` when running in memory only.
    pub fn aof(&self) -> Option<&PathBuf> {
        (!self.no_aof).then_some(&self.aof_path)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["driftkv"]).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:6380");
        assert_eq!(config.aof(), Some(&PathBuf::from("appendonly.aof")));
        assert_eq!(config.expiry().interval, Duration::from_secs(1));
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "driftkv",
            "-H",
            "0.0.0.0",
            "-p",
            "7000",
            "--aof",
            "/tmp/data/log.aof",
            "--sweep-interval-ms",
            "250",
            "--max-connections",
            "8",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.aof(), Some(&PathBuf::from("/tmp/data/log.aof")));
        assert_eq!(config.expiry().interval, Duration::from_millis(250));
        assert_eq!(config.max_connections, 8);
    }

    #[test]
    fn test_no_aof() {
        let config = Config::try_parse_from(["driftkv", "--no-aof"]).unwrap();
        assert_eq!(config.aof(), None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::try_parse_from(["driftkv", "--port", "http"]).is_err());
        assert!(Config::try_parse_from(["driftkv", "--sweep-interval-ms", "0"]).is_err());
        assert!(Config::try_parse_from(["driftkv", "--max-connections", "0"]).is_err());
    }
}
