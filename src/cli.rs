//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;

/// Static file server with range support and image-to-clip conversion
#[derive(Debug, Parser)]
#[command(name = "clipserve", version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Show version and encoder availability
    Info,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Document root
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Maximum upload size in MiB
    #[arg(long, value_name = "MIB")]
    pub upload_limit: Option<usize>,

    /// Encoder executable
    #[arg(long, value_name = "PROGRAM")]
    pub ffmpeg: Option<PathBuf>,

    /// Concurrent encoder processes (0 = unbounded)
    #[arg(long, value_name = "N")]
    pub max_conversions: Option<usize>,

    /// Kill encoders running longer than this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub conversion_timeout: Option<u64>,

    /// Config file (default: ./clipserve.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ServeArgs {
    /// Flags that override file configuration
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            port: self.port,
            bind: self.bind.clone(),
            root: self.root.clone(),
            upload_limit_mb: self.upload_limit,
            ffmpeg: self.ffmpeg.clone(),
            max_concurrent: self.max_conversions,
            timeout_secs: self.conversion_timeout,
        }
    }
}
