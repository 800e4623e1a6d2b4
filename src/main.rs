//! clipserve - static file server with image-to-clip conversion
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use clipserve::{exit_codes, Cli, Commands, Config, ConfigError, FfmpegCommand, ServeArgs, WebServer};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve(args) => run_serve(&args),
        Commands::Info => run_info(),
    };

    std::process::exit(match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            eprintln!("Error: {:#}", e);
            exit_codes::INVALID_CONFIG
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

/// `RUST_LOG` wins; otherwise `-v` picks the level
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============ Serve Command ============

fn run_serve(args: &ServeArgs) -> anyhow::Result<()> {
    let file_config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("{}; using defaults", e);
            Config::default()
        }),
    };
    let config = file_config.merge_with_cli(&args.overrides());

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        WebServer::with_config(config)
            .run()
            .await
            .map_err(|e| anyhow::anyhow!(e))
    })?;

    Ok(())
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<()> {
    let encoder = FfmpegCommand::default();

    println!("clipserve {}", env!("CARGO_PKG_VERSION"));
    match which::which(encoder.program()) {
        Ok(path) => println!("encoder: {} ({})", encoder.program().display(), path.display()),
        Err(_) => println!("encoder: {} (not found on PATH)", encoder.program().display()),
    }
    Ok(())
}
