// Command line interface for the server binary

use crate::config::{self, ServerConfig};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Store-and-forward message relay server
#[derive(Debug, Parser)]
#[command(name = "courier")]
#[command(about = "Store-and-forward message relay over a compact binary protocol")]
pub struct Cli {
    /// TCP port to listen on (overrides the port file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// File the listen port is read from when --port is absent
    #[arg(long, default_value = config::DEFAULT_PORT_FILE)]
    pub port_file: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// SQLite database path
    #[arg(long, default_value = config::DEFAULT_DB_FILE)]
    pub db: PathBuf,

    /// Maximum request payload size in bytes
    #[arg(long, default_value_t = config::DEFAULT_MAX_PAYLOAD)]
    pub max_payload: u32,

    /// Per-connection idle timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub idle_timeout: u64,

    /// Shutdown grace period in seconds
    #[arg(long, default_value_t = 5)]
    pub grace: u64,
}

impl Cli {
    /// Resolve the effective server configuration
    pub fn into_config(self) -> ServerConfig {
        let port = self
            .port
            .unwrap_or_else(|| config::resolve_port(&self.port_file));

        ServerConfig {
            listen_addr: self.listen_addr,
            port,
            db_path: self.db,
            max_payload: self.max_payload,
            idle_timeout: Duration::from_secs(self.idle_timeout),
            shutdown_grace: Duration::from_secs(self.grace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port_wins_over_port_file() {
        let cli = Cli::parse_from(["courier", "--port", "9999"]);
        let config = cli.into_config();
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["courier", "--port", "1357"]);
        let config = cli.into_config();

        assert_eq!(config.db_path, PathBuf::from(config::DEFAULT_DB_FILE));
        assert_eq!(config.max_payload, config::DEFAULT_MAX_PAYLOAD);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }
}
