//! Command-line arguments for logship-daemon.

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ship log files from a node to a central collector.
///
/// One process runs one role: `agent` on every node that produces logs,
/// `collector` on the host that stores them.
#[derive(Parser, Debug)]
#[command(name = "logship-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logship.toml configuration file.
    #[arg(short, long, default_value = "/etc/logship/logship.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration for the chosen role and exit.
    #[arg(long)]
    pub validate: bool,

    /// Role to run.
    #[command(subcommand)]
    pub role: Role,
}

/// Which half of logship this process runs.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Watch a directory, extract new records and send them to the collector.
    Agent,
    /// Receive payloads over HTTP and append them to per-origin files.
    Collector,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Collector => "collector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
