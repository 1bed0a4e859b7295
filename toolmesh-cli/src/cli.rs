//! CLI argument parsing definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Meta-server aggregating many upstream MCP tool providers behind a single endpoint", long_about = None)]
pub struct Cli {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the multi-client daemon (C10): one shared catalog/index/policy
    /// runtime, many sessions accepted over a loopback socket.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run a single MCP session directly over stdio, with no daemon in
    /// between. Suitable for a client that spawns one process per
    /// session and doesn't need to share a catalog across clients.
    Mcp {
        /// Path to the YAML configuration file.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the stdio<->daemon proxy bridge (C11): the process a client
    /// agent actually spawns, relaying MCP frames to a shared daemon.
    Proxy {
        /// Path to the YAML configuration file (read for the daemon
        /// directory and heartbeat timeout even though no upstreams are
        /// connected directly by this process).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Explicit daemon endpoint, bypassing the registry lookup.
        #[arg(long, value_name = "ENDPOINT")]
        endpoint: Option<String>,

        /// Identifies this client in the daemon's `hello` handshake.
        #[arg(long, value_name = "ID")]
        client_id: Option<String>,

        /// Never attempt to spawn a daemon when the registry is empty;
        /// fail immediately instead.
        #[arg(long)]
        no_spawn: bool,
    },

    /// Report whether a daemon is registered and reachable for the given
    /// configuration.
    Status {
        /// Path to the YAML configuration file.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Configuration inspection utilities.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load and validate a configuration file, printing either "ok" or
    /// the first validation error encountered.
    Validate {
        /// Path to the YAML configuration file.
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },

    /// Print a fully-commented starting-point configuration to stdout.
    Sample,
}
