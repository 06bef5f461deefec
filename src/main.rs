//! Nueva FS Bridge CLI
//!
//! Command-line driver for the engine file bridge.

use std::io;

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use nueva_fsbridge::cli::{commands, Cli, Commands};
use nueva_fsbridge::{BridgeConfig, FileBridge};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Nueva FS Bridge v{}", env!("CARGO_PKG_VERSION"));

    let bridge = FileBridge::with_disk(config).context("failed to start file bridge")?;
    let result = handle_command(&bridge, cli.command);
    bridge.shutdown();
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn handle_command(bridge: &FileBridge, cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Cat { identifier, chunk } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let total = commands::cat(bridge, &identifier, chunk, &mut out)?;
            info!("{}: {} bytes", identifier, total);
        }
        Commands::Stream { identifier, chunk } => {
            let summary = commands::stream(bridge, &identifier, chunk)?;
            println!(
                "{}: {} of {} bytes in {} async reads",
                identifier, summary.bytes_read, summary.size, summary.reads
            );
        }
        Commands::Checksum {
            identifier,
            chunk,
            depth,
        } => {
            let digest = commands::checksum(bridge, &identifier, chunk, depth)?;
            println!("{}  {}", digest, identifier);
        }
        Commands::Stats { identifiers } => {
            let stats = commands::stats(bridge, &identifiers);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
