//! Process configuration: command line with environment fallbacks

use clap::{Args, Parser, Subcommand};
use shared::{DEFAULT_BROKER_PORT, DEFAULT_HOST, DEFAULT_PERSISTENCE_PORT, MAX_FRAME_BYTES};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Score persistence and stats/notification services")]
pub struct Cli {
    #[command(subcommand)]
    pub service: ServiceCommand,
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Run the score persistence service
    Persistence {
        /// IP address to bind to
        #[arg(short = 'H', long, env = "PERSISTENCE_HOST", default_value = DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(short, long, env = "PERSISTENCE_PORT", default_value_t = DEFAULT_PERSISTENCE_PORT)]
        port: u16,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the stats and notification broker
    Broker {
        /// IP address to bind to
        #[arg(short = 'H', long, env = "BROKER_HOST", default_value = DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(short, long, env = "BROKER_PORT", default_value_t = DEFAULT_BROKER_PORT)]
        port: u16,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// SQLite database holding the user records
    #[arg(long, env = "RECORD_STORE_PATH", default_value = "users.db")]
    pub database: PathBuf,
    /// Connections served at once; extra ones are answered `server_busy`
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
    /// Largest accepted request line in bytes
    #[arg(long, env = "MAX_FRAME_BYTES", default_value_t = MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// How long a client may take to send its request
    #[arg(long, env = "READ_TIMEOUT_MS", default_value_t = 10_000)]
    pub read_timeout_ms: u64,
}

/// Per-connection resource bounds applied by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_connections: usize,
    pub max_frame_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_frame_bytes: MAX_FRAME_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Persistence,
    Broker,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    pub address: String,
    pub database: PathBuf,
    pub limits: Limits,
}

impl Cli {
    pub fn into_config(self) -> ServiceConfig {
        let (kind, host, port, common) = match self.service {
            ServiceCommand::Persistence { host, port, common } => {
                (ServiceKind::Persistence, host, port, common)
            }
            ServiceCommand::Broker { host, port, common } => {
                (ServiceKind::Broker, host, port, common)
            }
        };

        ServiceConfig {
            kind,
            address: format!("{}:{}", host, port),
            database: common.database,
            limits: Limits {
                // A zero-permit semaphore would reject every connection
                max_connections: common.max_connections.max(1),
                max_frame_bytes: common.max_frame_bytes,
                read_timeout: Duration::from_millis(common.read_timeout_ms),
            },
        }
    }
}
