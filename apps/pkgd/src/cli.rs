//! Command line interface definition

use clap::Parser;
use std::path::PathBuf;

/// pkgd - privileged package management daemon
#[derive(Parser, Debug)]
#[command(name = "pkgd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Privileged package management daemon")]
#[command(long_about = None)]
pub struct Cli {
    /// Use alternate config file
    #[arg(long, value_name = "PATH", env = "PKGD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen on this Unix socket instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Package catalog backing the reference engine
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Exit after this many idle seconds (0 keeps running)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,
}
