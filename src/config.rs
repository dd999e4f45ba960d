// Server configuration and port resolution

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used when no port file or CLI override is present
pub const DEFAULT_PORT: u16 = 1357;

/// File the listen port is read from when not given on the command line
pub const DEFAULT_PORT_FILE: &str = "myport.info";

/// Default database location
pub const DEFAULT_DB_FILE: &str = "courier.db";

/// Largest request payload the server will accept
pub const DEFAULT_MAX_PAYLOAD: u32 = 4 * 1024 * 1024;

/// Per-connection deadline for a full request/response exchange
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long in-flight connections get to flush on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Socket read granularity
pub const CHUNK_SIZE: usize = 4096;

/// Immutable server configuration, built once at startup and shared by
/// reference with the listener and every connection task.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub max_payload: u32,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            max_payload: DEFAULT_MAX_PAYLOAD,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Resolve the listen port from a port file.
///
/// A missing file, an empty file, or non-numeric content falls back to the
/// default port with a warning.
pub fn resolve_port(port_file: &Path) -> u16 {
    match std::fs::read_to_string(port_file) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                tracing::warn!(
                    "port file {} is empty, using default port {}",
                    port_file.display(),
                    DEFAULT_PORT
                );
                return DEFAULT_PORT;
            }
            match trimmed.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "port file {} contains invalid data, using default port {}",
                        port_file.display(),
                        DEFAULT_PORT
                    );
                    DEFAULT_PORT
                }
            }
        }
        Err(_) => {
            tracing::warn!(
                "port file {} not found, using default port {}",
                port_file.display(),
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}
